//! ActiveMQ destination types.
//!
//! Four physical kinds plus a composite destination whose physical name is a
//! comma-separated list of child names (ported from `ActiveMQDestinationSource`
//! in the original C++ client). Temporary destinations embed the owning
//! connection id in their physical name so the broker can garbage-collect
//! them when the connection dies.

use std::fmt;

use crate::ids::ConnectionId;

/// The four concrete destination kinds plus the composite case, five
/// variants total as called for by the data model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Queue(String),
    Topic(String),
    TemporaryQueue(String),
    TemporaryTopic(String),
    Composite(Vec<Destination>),
}

impl Destination {
    /// Build a temporary queue name that embeds the owning connection id,
    /// matching the broker-side convention for garbage collection on
    /// connection death.
    #[must_use]
    pub fn temporary_queue(connection_id: &ConnectionId, sequence: u64) -> Self {
        Self::TemporaryQueue(format!("{TEMP_PREFIX}{connection_id}:{sequence}"))
    }

    #[must_use]
    pub fn temporary_topic(connection_id: &ConnectionId, sequence: u64) -> Self {
        Self::TemporaryTopic(format!("{TEMP_PREFIX}{connection_id}:{sequence}"))
    }

    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::TemporaryQueue(_) | Self::TemporaryTopic(_))
    }

    #[must_use]
    pub const fn is_composite(&self) -> bool { matches!(self, Self::Composite(_)) }

    /// The owning connection id embedded in a temporary destination's
    /// physical name, if this is one.
    #[must_use]
    pub fn owning_connection(&self) -> Option<&str> {
        let name = match self {
            Self::TemporaryQueue(name) | Self::TemporaryTopic(name) => name,
            _ => return None,
        };
        name.strip_prefix(TEMP_PREFIX)?.split(':').next()
    }

    /// Parse a physical name into a destination, splitting composite names
    /// on `,` the way the broker does.
    #[must_use]
    pub fn parse(kind: DestinationKind, physical_name: &str) -> Self {
        if physical_name.contains(',') {
            let children = physical_name
                .split(',')
                .map(|part| Self::parse_single(kind, part.trim()))
                .collect();
            return Self::Composite(children);
        }
        Self::parse_single(kind, physical_name)
    }

    fn parse_single(kind: DestinationKind, name: &str) -> Self {
        match kind {
            DestinationKind::Queue => Self::Queue(name.to_owned()),
            DestinationKind::Topic => Self::Topic(name.to_owned()),
            DestinationKind::TemporaryQueue => Self::TemporaryQueue(name.to_owned()),
            DestinationKind::TemporaryTopic => Self::TemporaryTopic(name.to_owned()),
        }
    }

    /// Physical name as written on the wire; composite destinations
    /// reassemble their comma-separated form.
    #[must_use]
    pub fn physical_name(&self) -> String {
        match self {
            Self::Queue(n) | Self::Topic(n) | Self::TemporaryQueue(n) | Self::TemporaryTopic(n) => {
                n.clone()
            }
            Self::Composite(children) => children
                .iter()
                .map(Self::physical_name)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

const TEMP_PREFIX: &str = "ID:";

/// Discriminator used to reconstruct a [`Destination`] from a physical name
/// and a wire type tag, without needing a full destination on hand yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    Queue,
    Topic,
    TemporaryQueue,
    TemporaryTopic,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.physical_name())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DestinationKind::Queue, "A,B,C")]
    #[case(DestinationKind::Topic, "A,B")]
    fn composite_round_trips_physical_name(#[case] kind: DestinationKind, #[case] names: &str) {
        let dest = Destination::parse(kind, names);
        assert!(dest.is_composite());
        assert_eq!(dest.physical_name(), names);
    }

    #[test]
    fn temporary_queue_embeds_connection_id() {
        let conn = ConnectionId::new("ID:host-1234-0");
        let dest = Destination::temporary_queue(&conn, 3);
        assert!(dest.is_temporary());
        assert_eq!(dest.owning_connection(), Some("ID:host-1234-0"));
    }

    #[test]
    fn non_temporary_has_no_owner() {
        let dest = Destination::Queue("Q".into());
        assert_eq!(dest.owning_connection(), None);
    }
}
