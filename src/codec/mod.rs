//! The OpenWire marshaller: `Command` <-> wire bytes.
//!
//! Two encodings share one format: loose encoding writes every field
//! unconditionally; tight encoding prepends a [`BooleanStream`] of
//! presence/boolean bits and elides repeated cacheable values (destinations
//! and the hierarchical ids) behind a per-direction [`cache::WriterCache`] /
//! [`cache::ReaderCache`] pair, addressed by each value's canonical string
//! form per the redesign notes on cache-key identity.

pub mod boolean_stream;
pub mod cache;
pub mod errors;
pub mod frame;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::{
    AckType, BrokerInfo, Command, CommandHeader, ConnectionControl, ConnectionInfo,
    ConsumerControl, ConsumerControlKind, ConsumerInfo, DestinationInfo, DestinationOp,
    ExceptionResponse, KeepAliveInfo, Message, MessageAck, MessageDispatch, MessagePull,
    ProducerAck, ProducerInfo, RemoveInfo, Response, SessionInfo, ShutdownInfo, TransactionInfo,
    TransactionOp, WireFormatInfo,
};
use crate::destination::{Destination, DestinationKind};
use crate::ids::{ConnectionId, ConsumerId, LocalTransactionId, MessageId, ProducerId, SessionId, TransactionId, XaTransactionId};
use crate::primitives::{self, PrimitiveMap};

pub use boolean_stream::BooleanStream;
pub use cache::{ReaderCache, WriterCache};
pub use errors::CodecError;

/// Negotiated (or default, pre-negotiation) wire-format options (§6).
#[derive(Debug, Clone)]
pub struct WireFormatOptions {
    pub version: u32,
    pub tight_encoding_enabled: bool,
    pub cache_enabled: bool,
    pub cache_size: u16,
    pub stack_trace_enabled: bool,
    pub size_prefix_disabled: bool,
    pub max_inactivity_duration: Duration,
    pub max_inactivity_duration_initial_delay: Duration,
    pub max_frame_size: u32,
}

impl Default for WireFormatOptions {
    fn default() -> Self {
        Self {
            version: crate::command::MAX_VERSION,
            tight_encoding_enabled: true,
            cache_enabled: true,
            cache_size: 1024,
            stack_trace_enabled: false,
            size_prefix_disabled: false,
            max_inactivity_duration: Duration::from_secs(30),
            max_inactivity_duration_initial_delay: Duration::from_secs(10),
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl WireFormatOptions {
    #[must_use]
    pub fn to_properties(&self) -> PrimitiveMap {
        use primitives::PrimitiveValue as V;
        let mut map = PrimitiveMap::new();
        map.insert("TightEncodingEnabled".into(), V::Boolean(self.tight_encoding_enabled));
        map.insert("CacheEnabled".into(), V::Boolean(self.cache_enabled));
        map.insert("CacheSize".into(), V::Int(i32::from(self.cache_size)));
        map.insert("StackTraceEnabled".into(), V::Boolean(self.stack_trace_enabled));
        map.insert("SizePrefixDisabled".into(), V::Boolean(self.size_prefix_disabled));
        #[allow(clippy::cast_possible_truncation, reason = "durations are configured in the tens of seconds")]
        map.insert(
            "MaxInactivityDuration".into(),
            V::Long(self.max_inactivity_duration.as_millis() as i64),
        );
        #[allow(clippy::cast_possible_truncation, reason = "durations are configured in the tens of seconds")]
        map.insert(
            "MaxInactivityDurationInitalDelay".into(),
            V::Long(self.max_inactivity_duration_initial_delay.as_millis() as i64),
        );
        map.insert("MaxFrameSize".into(), V::Long(i64::from(self.max_frame_size)));
        map
    }

    #[must_use]
    pub fn from_wire_format_info(info: &WireFormatInfo) -> Self {
        Self {
            version: info.version,
            tight_encoding_enabled: info.bool_property("TightEncodingEnabled", false),
            cache_enabled: info.bool_property("CacheEnabled", false),
            cache_size: u16::try_from(info.long_property("CacheSize", 1024)).unwrap_or(1024),
            stack_trace_enabled: info.bool_property("StackTraceEnabled", false),
            size_prefix_disabled: info.bool_property("SizePrefixDisabled", false),
            max_inactivity_duration: Duration::from_millis(
                u64::try_from(info.long_property("MaxInactivityDuration", 30_000)).unwrap_or(30_000),
            ),
            max_inactivity_duration_initial_delay: Duration::from_millis(
                u64::try_from(info.long_property("MaxInactivityDurationInitalDelay", 10_000)).unwrap_or(10_000),
            ),
            max_frame_size: u32::try_from(info.long_property(
                "MaxFrameSize",
                i64::from(frame::DEFAULT_MAX_FRAME_SIZE),
            ))
            .unwrap_or(frame::DEFAULT_MAX_FRAME_SIZE),
        }
    }

    /// Combine local preference with a peer's advertised options per the
    /// negotiation rule: the minimum of the two for size-like fields, and
    /// the logical AND of the two for boolean capability fields.
    #[must_use]
    pub fn merged_with(&self, peer: &Self) -> Self {
        Self {
            version: self.version.min(peer.version),
            tight_encoding_enabled: self.tight_encoding_enabled && peer.tight_encoding_enabled,
            cache_enabled: self.cache_enabled && peer.cache_enabled,
            cache_size: self.cache_size.min(peer.cache_size),
            stack_trace_enabled: self.stack_trace_enabled && peer.stack_trace_enabled,
            size_prefix_disabled: self.size_prefix_disabled && peer.size_prefix_disabled,
            max_inactivity_duration: self.max_inactivity_duration.min(peer.max_inactivity_duration),
            max_inactivity_duration_initial_delay: self
                .max_inactivity_duration_initial_delay
                .min(peer.max_inactivity_duration_initial_delay),
            max_frame_size: self.max_frame_size.min(peer.max_frame_size),
        }
    }
}

/// The stateful per-connection marshaller: negotiated options plus the
/// identifier caches used by tight encoding.
pub struct OpenWireFormat {
    pub options: WireFormatOptions,
    destination_writer: WriterCache<String>,
    destination_reader: ReaderCache<String>,
}

impl Default for OpenWireFormat {
    fn default() -> Self { Self::new(WireFormatOptions::default()) }
}

impl OpenWireFormat {
    #[must_use]
    pub fn new(options: WireFormatOptions) -> Self {
        let size = options.cache_size as usize;
        Self {
            options,
            destination_writer: WriterCache::new(size.max(1)),
            destination_reader: ReaderCache::new(size.max(1)),
        }
    }

    pub fn reset_caches(&mut self) {
        self.destination_writer.clear();
        self.destination_reader.clear();
    }

    /// Marshal `command` into a self-delimiting frame body (type tag + payload,
    /// excluding the outer length prefix written by [`frame::write_frame`]).
    ///
    /// Dispatches to tight or loose encoding per [`WireFormatOptions::tight_encoding_enabled`].
    /// Tight encoding prepends a [`BooleanStream`] of every boolean value and
    /// nullable-reference presence flag walked in field order, then writes
    /// the remaining field payloads; loose encoding writes every field
    /// unconditionally, presence flags and booleans included, inline.
    ///
    /// # Errors
    /// Returns [`CodecError::OversizedFrame`] if a length field would overflow.
    pub fn marshal(&mut self, command: &Command) -> Result<Vec<u8>, CodecError> {
        let mut out = vec![command.type_tag()];
        write_header(&mut out, command.header());
        if self.options.tight_encoding_enabled {
            let mut bits = BooleanStream::new();
            let mut payload = Vec::new();
            self.marshal_body_tight(command, &mut bits, &mut payload)?;
            out.extend_from_slice(&bits.marshal());
            out.extend_from_slice(&payload);
        } else {
            self.marshal_body(command, &mut out)?;
        }
        Ok(out)
    }

    /// Unmarshal one frame body (as produced by [`Self::marshal`]) into a
    /// [`Command`].
    ///
    /// # Errors
    /// Returns [`CodecError::UnknownTypeTag`] for an unrecognised tag, or
    /// [`CodecError::Truncated`] if the body ends early.
    pub fn unmarshal(&mut self, buf: &[u8]) -> Result<Command, CodecError> {
        let mut cur = Reader::new(buf);
        let type_tag = cur.u8()?;
        let header = read_header(&mut cur)?;
        if self.options.tight_encoding_enabled {
            let (mut bits, consumed) = BooleanStream::unmarshal_all(cur.remaining())?;
            cur.take(consumed)?;
            self.unmarshal_body_tight(type_tag, header, &mut bits, &mut cur)
        } else {
            self.unmarshal_body(type_tag, header, &mut cur)
        }
    }

    fn write_destination(&mut self, out: &mut Vec<u8>, dest: Option<&Destination>) {
        let Some(dest) = dest else {
            out.push(0);
            return;
        };
        out.push(1);
        let kind = destination_kind_tag(dest);
        out.push(kind);
        let physical = dest.physical_name();
        if self.options.cache_enabled {
            if let Some(id) = self.destination_writer.lookup(&physical) {
                out.push(1);
                out.extend_from_slice(&id.to_be_bytes());
                return;
            }
            let id = self.destination_writer.assign(physical.clone());
            out.push(0);
            out.extend_from_slice(&id.to_be_bytes());
        }
        write_string(out, &physical);
    }

    fn read_destination(&mut self, cur: &mut Reader<'_>) -> Result<Option<Destination>, CodecError> {
        if cur.u8()? == 0 {
            return Ok(None);
        }
        let kind = destination_kind_from_tag(cur.u8()?)?;
        if self.options.cache_enabled {
            let cached = cur.u8()? != 0;
            let id = cur.u16()?;
            if cached {
                let physical = self.destination_reader.resolve(id)?;
                return Ok(Some(Destination::parse(kind, &physical)));
            }
            let physical = read_string(cur)?;
            self.destination_reader.insert(id, physical.clone());
            return Ok(Some(Destination::parse(kind, &physical)));
        }
        let physical = read_string(cur)?;
        Ok(Some(Destination::parse(kind, &physical)))
    }

    /// Tight-encoding counterpart to [`Self::write_destination`]: the
    /// presence flag and (when caching is enabled) the cache-hit flag move
    /// into `bits` instead of being written inline.
    fn tight_write_destination(&mut self, bits: &mut BooleanStream, out: &mut Vec<u8>, dest: Option<&Destination>) {
        let Some(dest) = dest else {
            bits.write_bit(false);
            return;
        };
        bits.write_bit(true);
        out.push(destination_kind_tag(dest));
        let physical = dest.physical_name();
        if self.options.cache_enabled {
            if let Some(id) = self.destination_writer.lookup(&physical) {
                bits.write_bit(true);
                out.extend_from_slice(&id.to_be_bytes());
                return;
            }
            let id = self.destination_writer.assign(physical.clone());
            bits.write_bit(false);
            out.extend_from_slice(&id.to_be_bytes());
            return;
        }
        write_string(out, &physical);
    }

    /// Tight-encoding counterpart to [`Self::read_destination`].
    fn tight_read_destination(
        &mut self,
        bits: &mut BooleanStream,
        cur: &mut Reader<'_>,
    ) -> Result<Option<Destination>, CodecError> {
        if !bits.read_bit()? {
            return Ok(None);
        }
        let kind = destination_kind_from_tag(cur.u8()?)?;
        if self.options.cache_enabled {
            let cached = bits.read_bit()?;
            let id = cur.u16()?;
            if cached {
                let physical = self.destination_reader.resolve(id)?;
                return Ok(Some(Destination::parse(kind, &physical)));
            }
            let physical = read_string(cur)?;
            self.destination_reader.insert(id, physical.clone());
            return Ok(Some(Destination::parse(kind, &physical)));
        }
        let physical = read_string(cur)?;
        Ok(Some(Destination::parse(kind, &physical)))
    }

    #[allow(clippy::too_many_lines)]
    fn marshal_body(&mut self, command: &Command, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match command {
            Command::WireFormatInfo(c) => {
                out.extend_from_slice(crate::command::MAGIC);
                out.extend_from_slice(&c.version.to_be_bytes());
                primitives::write_map(out, &c.properties)?;
            }
            Command::BrokerInfo(c) => {
                write_opt_string(out, c.broker_id.as_deref());
                write_opt_string(out, c.broker_url.as_deref());
                write_u32(out, u32::try_from(c.peer_brokers.len()).map_err(|_| CodecError::OversizedFrame)?);
                for url in &c.peer_brokers {
                    write_string(out, url);
                }
            }
            Command::ConnectionInfo(c) => {
                write_string(out, c.connection_id.as_str());
                write_opt_string(out, c.client_id.as_deref());
                write_opt_string(out, c.user_name.as_deref());
                write_opt_string(out, c.password.as_deref());
                out.push(u8::from(c.manage_destinations));
                out.push(u8::from(c.client_master));
                out.push(u8::from(c.failover_reconnect));
            }
            Command::SessionInfo(c) => {
                write_string(out, c.session_id.connection_id.as_str());
                write_u64(out, c.session_id.value);
            }
            Command::ConsumerInfo(c) => {
                write_consumer_id(out, &c.consumer_id);
                self.write_destination(out, c.destination.as_ref());
                write_opt_string(out, c.selector.as_deref());
                out.push(u8::from(c.no_local));
                out.push(u8::from(c.exclusive));
                out.push(u8::from(c.durable));
                write_opt_string(out, c.subscription_name.as_deref());
                write_u32(out, c.prefetch_size);
                out.push(c.priority.to_be_bytes()[0]);
                out.push(u8::from(c.dispatch_async));
            }
            Command::ProducerInfo(c) => {
                write_producer_id(out, &c.producer_id);
                self.write_destination(out, c.destination.as_ref());
                out.push(u8::from(c.dispatch_async));
                write_u32(out, c.window_size);
            }
            Command::ProducerAck(c) => {
                write_opt_producer_id(out, c.producer_id.as_ref());
                write_u32(out, c.size);
            }
            Command::TransactionInfo(c) => {
                write_transaction_id(out, &c.transaction_id);
                out.push(transaction_op_tag(c.op));
            }
            Command::DestinationInfo(c) => {
                write_opt_string(out, c.connection_id.as_ref().map(ConnectionId::as_str));
                out.push(destination_kind_tag(&c.destination));
                write_string(out, &c.destination.physical_name());
                out.push(u8::from(matches!(c.op, DestinationOp::Add)));
            }
            Command::RemoveInfo(c) => {
                write_opt_string(out, c.connection_id.as_ref().map(ConnectionId::as_str));
                write_opt_u64(out, c.session_value);
                write_opt_u64(out, c.producer_value);
                write_opt_u64(out, c.consumer_value);
                write_opt_u64(out, c.last_delivered_sequence_id);
            }
            Command::KeepAliveInfo(_) | Command::ShutdownInfo(_) => {}
            Command::ConnectionControl(c) => {
                out.push(u8::from(c.close));
                out.push(u8::from(c.exit));
                write_opt_string(out, c.fail_over_urls.as_deref());
            }
            Command::ConsumerControl(c) => {
                write_opt_consumer_id(out, c.consumer_id.as_ref());
                out.push(consumer_control_kind_tag(c.kind));
                write_opt_u32(out, c.prefetch);
            }
            Command::Message(c) => self.marshal_message(c, out)?,
            Command::MessageAck(c) => {
                write_opt_consumer_id(out, c.consumer_id.as_ref());
                write_transaction_id(out, &c.transaction_id);
                self.write_destination(out, c.destination.as_ref());
                out.push(ack_type_tag(c.ack_type));
                write_opt_message_id(out, c.first_message_id.as_ref());
                write_opt_message_id(out, c.last_message_id.as_ref());
                write_u32(out, c.message_count);
                out.push(u8::from(c.poison_ack));
            }
            Command::MessageDispatch(c) => {
                write_opt_consumer_id(out, c.consumer_id.as_ref());
                self.write_destination(out, c.destination.as_ref());
                out.push(u8::from(c.message.is_some()));
                if let Some(message) = &c.message {
                    self.marshal_message(message, out)?;
                }
                write_u32(out, c.redelivery_counter);
            }
            Command::MessagePull(c) => {
                write_opt_consumer_id(out, c.consumer_id.as_ref());
                self.write_destination(out, c.destination.as_ref());
                out.extend_from_slice(&c.timeout_ms.to_be_bytes());
            }
            Command::Response(c) => write_u32(out, c.correlation_id),
            Command::ExceptionResponse(c) => {
                write_u32(out, c.correlation_id);
                write_opt_string(out, c.exception_class.as_deref());
                write_string(out, &c.message);
                if self.options.stack_trace_enabled {
                    write_opt_string(out, c.stack_trace.as_deref());
                }
            }
        }
        Ok(())
    }

    fn marshal_message(&mut self, message: &Message, out: &mut Vec<u8>) -> Result<(), CodecError> {
        write_opt_message_id(out, message.message_id.as_ref());
        write_opt_producer_id(out, message.producer_id.as_ref());
        self.write_destination(out, message.destination.as_ref());
        self.write_destination(out, message.reply_to.as_ref());
        write_transaction_id(out, &message.transaction_id);
        out.push(u8::from(message.persistent));
        out.push(message.priority);
        write_u64(out, message.timestamp);
        write_u64(out, message.expiration);
        write_opt_string(out, message.correlation_id.as_deref());
        write_u32(out, message.redelivery_counter);
        out.push(u8::from(message.compressed));
        primitives::write_map(out, &message.properties)?;
        write_u32(out, u32::try_from(message.body.len()).map_err(|_| CodecError::OversizedFrame)?);
        out.extend_from_slice(&message.body);
        Ok(())
    }

    /// Tight-encoding counterpart to [`Self::marshal_body`]. Every bare
    /// boolean and nullable-reference presence flag the loose path writes
    /// inline is pushed to `bits` instead; everything else (lengths,
    /// numbers, tag bytes, string/array bodies) still goes straight to
    /// `payload`. `TransactionId` and the various kind tags describe their
    /// own shape with a leading discriminant byte, the same way
    /// [`Destination`]'s kind tag does, so they stay out of the bit stream.
    #[allow(clippy::too_many_lines)]
    fn marshal_body_tight(
        &mut self,
        command: &Command,
        bits: &mut BooleanStream,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        match command {
            Command::WireFormatInfo(c) => {
                out.extend_from_slice(crate::command::MAGIC);
                out.extend_from_slice(&c.version.to_be_bytes());
                primitives::write_map(out, &c.properties)?;
            }
            Command::BrokerInfo(c) => {
                tight_write_opt_string(bits, out, c.broker_id.as_deref());
                tight_write_opt_string(bits, out, c.broker_url.as_deref());
                write_u32(out, u32::try_from(c.peer_brokers.len()).map_err(|_| CodecError::OversizedFrame)?);
                for url in &c.peer_brokers {
                    write_string(out, url);
                }
            }
            Command::ConnectionInfo(c) => {
                write_string(out, c.connection_id.as_str());
                tight_write_opt_string(bits, out, c.client_id.as_deref());
                tight_write_opt_string(bits, out, c.user_name.as_deref());
                tight_write_opt_string(bits, out, c.password.as_deref());
                bits.write_bit(c.manage_destinations);
                bits.write_bit(c.client_master);
                bits.write_bit(c.failover_reconnect);
            }
            Command::SessionInfo(c) => {
                write_string(out, c.session_id.connection_id.as_str());
                write_u64(out, c.session_id.value);
            }
            Command::ConsumerInfo(c) => {
                write_consumer_id(out, &c.consumer_id);
                self.tight_write_destination(bits, out, c.destination.as_ref());
                tight_write_opt_string(bits, out, c.selector.as_deref());
                bits.write_bit(c.no_local);
                bits.write_bit(c.exclusive);
                bits.write_bit(c.durable);
                tight_write_opt_string(bits, out, c.subscription_name.as_deref());
                write_u32(out, c.prefetch_size);
                out.push(c.priority.to_be_bytes()[0]);
                bits.write_bit(c.dispatch_async);
            }
            Command::ProducerInfo(c) => {
                write_producer_id(out, &c.producer_id);
                self.tight_write_destination(bits, out, c.destination.as_ref());
                bits.write_bit(c.dispatch_async);
                write_u32(out, c.window_size);
            }
            Command::ProducerAck(c) => {
                tight_write_opt_producer_id(bits, out, c.producer_id.as_ref());
                write_u32(out, c.size);
            }
            Command::TransactionInfo(c) => {
                write_transaction_id(out, &c.transaction_id);
                out.push(transaction_op_tag(c.op));
            }
            Command::DestinationInfo(c) => {
                tight_write_opt_string(bits, out, c.connection_id.as_ref().map(ConnectionId::as_str));
                out.push(destination_kind_tag(&c.destination));
                write_string(out, &c.destination.physical_name());
                bits.write_bit(matches!(c.op, DestinationOp::Add));
            }
            Command::RemoveInfo(c) => {
                tight_write_opt_string(bits, out, c.connection_id.as_ref().map(ConnectionId::as_str));
                tight_write_opt_u64(bits, out, c.session_value);
                tight_write_opt_u64(bits, out, c.producer_value);
                tight_write_opt_u64(bits, out, c.consumer_value);
                tight_write_opt_u64(bits, out, c.last_delivered_sequence_id);
            }
            Command::KeepAliveInfo(_) | Command::ShutdownInfo(_) => {}
            Command::ConnectionControl(c) => {
                bits.write_bit(c.close);
                bits.write_bit(c.exit);
                tight_write_opt_string(bits, out, c.fail_over_urls.as_deref());
            }
            Command::ConsumerControl(c) => {
                tight_write_opt_consumer_id(bits, out, c.consumer_id.as_ref());
                out.push(consumer_control_kind_tag(c.kind));
                tight_write_opt_u32(bits, out, c.prefetch);
            }
            Command::Message(c) => self.marshal_message_tight(c, bits, out)?,
            Command::MessageAck(c) => {
                tight_write_opt_consumer_id(bits, out, c.consumer_id.as_ref());
                write_transaction_id(out, &c.transaction_id);
                self.tight_write_destination(bits, out, c.destination.as_ref());
                out.push(ack_type_tag(c.ack_type));
                tight_write_opt_message_id(bits, out, c.first_message_id.as_ref());
                tight_write_opt_message_id(bits, out, c.last_message_id.as_ref());
                write_u32(out, c.message_count);
                bits.write_bit(c.poison_ack);
            }
            Command::MessageDispatch(c) => {
                tight_write_opt_consumer_id(bits, out, c.consumer_id.as_ref());
                self.tight_write_destination(bits, out, c.destination.as_ref());
                bits.write_bit(c.message.is_some());
                if let Some(message) = &c.message {
                    self.marshal_message_tight(message, bits, out)?;
                }
                write_u32(out, c.redelivery_counter);
            }
            Command::MessagePull(c) => {
                tight_write_opt_consumer_id(bits, out, c.consumer_id.as_ref());
                self.tight_write_destination(bits, out, c.destination.as_ref());
                out.extend_from_slice(&c.timeout_ms.to_be_bytes());
            }
            Command::Response(c) => write_u32(out, c.correlation_id),
            Command::ExceptionResponse(c) => {
                write_u32(out, c.correlation_id);
                tight_write_opt_string(bits, out, c.exception_class.as_deref());
                write_string(out, &c.message);
                if self.options.stack_trace_enabled {
                    tight_write_opt_string(bits, out, c.stack_trace.as_deref());
                }
            }
        }
        Ok(())
    }

    fn marshal_message_tight(
        &mut self,
        message: &Message,
        bits: &mut BooleanStream,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        tight_write_opt_message_id(bits, out, message.message_id.as_ref());
        tight_write_opt_producer_id(bits, out, message.producer_id.as_ref());
        self.tight_write_destination(bits, out, message.destination.as_ref());
        self.tight_write_destination(bits, out, message.reply_to.as_ref());
        write_transaction_id(out, &message.transaction_id);
        bits.write_bit(message.persistent);
        out.push(message.priority);
        write_u64(out, message.timestamp);
        write_u64(out, message.expiration);
        tight_write_opt_string(bits, out, message.correlation_id.as_deref());
        write_u32(out, message.redelivery_counter);
        bits.write_bit(message.compressed);
        primitives::write_map(out, &message.properties)?;
        write_u32(out, u32::try_from(message.body.len()).map_err(|_| CodecError::OversizedFrame)?);
        out.extend_from_slice(&message.body);
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn unmarshal_body(
        &mut self,
        type_tag: u8,
        header: CommandHeader,
        cur: &mut Reader<'_>,
    ) -> Result<Command, CodecError> {
        use crate::command::tag;
        Ok(match type_tag {
            tag::WIREFORMAT_INFO => {
                let magic = cur.take(8)?;
                if magic != crate::command::MAGIC {
                    return Err(CodecError::BadMagic);
                }
                let version = cur.u32()?;
                let (properties, consumed) = primitives::read_map(cur.remaining())?;
                cur.take(consumed)?;
                Command::WireFormatInfo(WireFormatInfo { header, version, properties })
            }
            tag::BROKER_INFO => {
                let broker_id = read_opt_string(cur)?;
                let broker_url = read_opt_string(cur)?;
                let count = cur.u32()?;
                let mut peer_brokers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    peer_brokers.push(read_string(cur)?);
                }
                Command::BrokerInfo(BrokerInfo { header, broker_id, broker_url, peer_brokers })
            }
            tag::CONNECTION_INFO => {
                let connection_id = ConnectionId::new(read_string(cur)?);
                let client_id = read_opt_string(cur)?;
                let user_name = read_opt_string(cur)?;
                let password = read_opt_string(cur)?;
                let manage_destinations = cur.u8()? != 0;
                let client_master = cur.u8()? != 0;
                let failover_reconnect = cur.u8()? != 0;
                Command::ConnectionInfo(ConnectionInfo {
                    header,
                    connection_id,
                    client_id,
                    user_name,
                    password,
                    manage_destinations,
                    client_master,
                    failover_reconnect,
                })
            }
            tag::SESSION_INFO => {
                let connection_id = ConnectionId::new(read_string(cur)?);
                let value = cur.u64()?;
                Command::SessionInfo(SessionInfo { header, session_id: SessionId { connection_id, value } })
            }
            tag::CONSUMER_INFO => {
                let consumer_id = read_consumer_id(cur)?;
                let destination = self.read_destination(cur)?;
                let selector = read_opt_string(cur)?;
                let no_local = cur.u8()? != 0;
                let exclusive = cur.u8()? != 0;
                let durable = cur.u8()? != 0;
                let subscription_name = read_opt_string(cur)?;
                let prefetch_size = cur.u32()?;
                let priority = cur.u8()? as i8;
                let dispatch_async = cur.u8()? != 0;
                Command::ConsumerInfo(ConsumerInfo {
                    header,
                    consumer_id,
                    destination,
                    selector,
                    no_local,
                    exclusive,
                    durable,
                    subscription_name,
                    prefetch_size,
                    priority,
                    dispatch_async,
                })
            }
            tag::PRODUCER_INFO => {
                let producer_id = read_producer_id(cur)?;
                let destination = self.read_destination(cur)?;
                let dispatch_async = cur.u8()? != 0;
                let window_size = cur.u32()?;
                Command::ProducerInfo(ProducerInfo { header, producer_id, destination, dispatch_async, window_size })
            }
            tag::PRODUCER_ACK => {
                let producer_id = read_opt_producer_id(cur)?;
                let size = cur.u32()?;
                Command::ProducerAck(ProducerAck { header, producer_id, size })
            }
            tag::TRANSACTION_INFO => {
                let transaction_id = read_transaction_id(cur)?;
                let op = transaction_op_from_tag(cur.u8()?)?;
                Command::TransactionInfo(TransactionInfo { header, transaction_id, op })
            }
            tag::DESTINATION_INFO => {
                let connection_id = read_opt_string(cur)?.map(ConnectionId::new);
                let kind = destination_kind_from_tag(cur.u8()?)?;
                let physical = read_string(cur)?;
                let destination = Destination::parse(kind, &physical);
                let op = if cur.u8()? != 0 { DestinationOp::Add } else { DestinationOp::Remove };
                Command::DestinationInfo(DestinationInfo { header, connection_id, destination, op })
            }
            tag::REMOVE_INFO => {
                let connection_id = read_opt_string(cur)?.map(ConnectionId::new);
                let session_value = read_opt_u64(cur)?;
                let producer_value = read_opt_u64(cur)?;
                let consumer_value = read_opt_u64(cur)?;
                let last_delivered_sequence_id = read_opt_u64(cur)?;
                Command::RemoveInfo(RemoveInfo {
                    header,
                    connection_id,
                    session_value,
                    producer_value,
                    consumer_value,
                    last_delivered_sequence_id,
                })
            }
            tag::KEEP_ALIVE_INFO => Command::KeepAliveInfo(KeepAliveInfo { header }),
            tag::SHUTDOWN_INFO => Command::ShutdownInfo(ShutdownInfo { header }),
            tag::CONNECTION_CONTROL => {
                let close = cur.u8()? != 0;
                let exit = cur.u8()? != 0;
                let fail_over_urls = read_opt_string(cur)?;
                Command::ConnectionControl(ConnectionControl { header, close, exit, fail_over_urls })
            }
            tag::CONSUMER_CONTROL => {
                let consumer_id = read_opt_consumer_id(cur)?;
                let kind = consumer_control_kind_from_tag(cur.u8()?)?;
                let prefetch = read_opt_u32(cur)?;
                Command::ConsumerControl(ConsumerControl { header, consumer_id, kind, prefetch })
            }
            tag::MESSAGE => Command::Message(Box::new(self.unmarshal_message(header, cur)?)),
            tag::MESSAGE_ACK => {
                let consumer_id = read_opt_consumer_id(cur)?;
                let transaction_id = read_transaction_id(cur)?;
                let destination = self.read_destination(cur)?;
                let ack_type = ack_type_from_tag(cur.u8()?)?;
                let first_message_id = read_opt_message_id(cur)?;
                let last_message_id = read_opt_message_id(cur)?;
                let message_count = cur.u32()?;
                let poison_ack = cur.u8()? != 0;
                Command::MessageAck(MessageAck {
                    header,
                    consumer_id,
                    transaction_id,
                    destination,
                    ack_type,
                    first_message_id,
                    last_message_id,
                    message_count,
                    poison_ack,
                })
            }
            tag::MESSAGE_DISPATCH => {
                let consumer_id = read_opt_consumer_id(cur)?;
                let destination = self.read_destination(cur)?;
                let has_message = cur.u8()? != 0;
                let message = if has_message { Some(self.unmarshal_message(CommandHeader::default(), cur)?) } else { None };
                let redelivery_counter = cur.u32()?;
                Command::MessageDispatch(Box::new(MessageDispatch {
                    header,
                    consumer_id,
                    destination,
                    message,
                    redelivery_counter,
                }))
            }
            tag::MESSAGE_PULL => {
                let consumer_id = read_opt_consumer_id(cur)?;
                let destination = self.read_destination(cur)?;
                let timeout_ms = cur.i64()?;
                Command::MessagePull(MessagePull { header, consumer_id, destination, timeout_ms })
            }
            tag::RESPONSE => Command::Response(Response { header, correlation_id: cur.u32()? }),
            tag::EXCEPTION_RESPONSE => {
                let correlation_id = cur.u32()?;
                let exception_class = read_opt_string(cur)?;
                let message = read_string(cur)?;
                let stack_trace = if self.options.stack_trace_enabled { read_opt_string(cur)? } else { None };
                Command::ExceptionResponse(ExceptionResponse {
                    header,
                    correlation_id,
                    exception_class,
                    message,
                    stack_trace,
                })
            }
            other => return Err(CodecError::UnknownTypeTag(other)),
        })
    }

    fn unmarshal_message(&mut self, header: CommandHeader, cur: &mut Reader<'_>) -> Result<Message, CodecError> {
        let message_id = read_opt_message_id(cur)?;
        let producer_id = read_opt_producer_id(cur)?;
        let destination = self.read_destination(cur)?;
        let reply_to = self.read_destination(cur)?;
        let transaction_id = read_transaction_id(cur)?;
        let persistent = cur.u8()? != 0;
        let priority = cur.u8()?;
        let timestamp = cur.u64()?;
        let expiration = cur.u64()?;
        let correlation_id = read_opt_string(cur)?;
        let redelivery_counter = cur.u32()?;
        let compressed = cur.u8()? != 0;
        let (properties, consumed) = primitives::read_map(cur.remaining())?;
        cur.take(consumed)?;
        let body_len = cur.u32()? as usize;
        let body = cur.take(body_len)?.to_vec();
        Ok(Message {
            header,
            message_id,
            producer_id,
            destination,
            reply_to,
            transaction_id,
            persistent,
            priority,
            timestamp,
            expiration,
            correlation_id,
            redelivery_counter,
            compressed,
            properties,
            body,
        })
    }

    /// Tight-encoding counterpart to [`Self::unmarshal_body`]. Reads bits
    /// from `bits` in exactly the order [`Self::marshal_body_tight`] wrote
    /// them.
    #[allow(clippy::too_many_lines)]
    fn unmarshal_body_tight(
        &mut self,
        type_tag: u8,
        header: CommandHeader,
        bits: &mut BooleanStream,
        cur: &mut Reader<'_>,
    ) -> Result<Command, CodecError> {
        use crate::command::tag;
        Ok(match type_tag {
            tag::WIREFORMAT_INFO => {
                let magic = cur.take(8)?;
                if magic != crate::command::MAGIC {
                    return Err(CodecError::BadMagic);
                }
                let version = cur.u32()?;
                let (properties, consumed) = primitives::read_map(cur.remaining())?;
                cur.take(consumed)?;
                Command::WireFormatInfo(WireFormatInfo { header, version, properties })
            }
            tag::BROKER_INFO => {
                let broker_id = tight_read_opt_string(bits, cur)?;
                let broker_url = tight_read_opt_string(bits, cur)?;
                let count = cur.u32()?;
                let mut peer_brokers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    peer_brokers.push(read_string(cur)?);
                }
                Command::BrokerInfo(BrokerInfo { header, broker_id, broker_url, peer_brokers })
            }
            tag::CONNECTION_INFO => {
                let connection_id = ConnectionId::new(read_string(cur)?);
                let client_id = tight_read_opt_string(bits, cur)?;
                let user_name = tight_read_opt_string(bits, cur)?;
                let password = tight_read_opt_string(bits, cur)?;
                let manage_destinations = bits.read_bit()?;
                let client_master = bits.read_bit()?;
                let failover_reconnect = bits.read_bit()?;
                Command::ConnectionInfo(ConnectionInfo {
                    header,
                    connection_id,
                    client_id,
                    user_name,
                    password,
                    manage_destinations,
                    client_master,
                    failover_reconnect,
                })
            }
            tag::SESSION_INFO => {
                let connection_id = ConnectionId::new(read_string(cur)?);
                let value = cur.u64()?;
                Command::SessionInfo(SessionInfo { header, session_id: SessionId { connection_id, value } })
            }
            tag::CONSUMER_INFO => {
                let consumer_id = read_consumer_id(cur)?;
                let destination = self.tight_read_destination(bits, cur)?;
                let selector = tight_read_opt_string(bits, cur)?;
                let no_local = bits.read_bit()?;
                let exclusive = bits.read_bit()?;
                let durable = bits.read_bit()?;
                let subscription_name = tight_read_opt_string(bits, cur)?;
                let prefetch_size = cur.u32()?;
                let priority = cur.u8()? as i8;
                let dispatch_async = bits.read_bit()?;
                Command::ConsumerInfo(ConsumerInfo {
                    header,
                    consumer_id,
                    destination,
                    selector,
                    no_local,
                    exclusive,
                    durable,
                    subscription_name,
                    prefetch_size,
                    priority,
                    dispatch_async,
                })
            }
            tag::PRODUCER_INFO => {
                let producer_id = read_producer_id(cur)?;
                let destination = self.tight_read_destination(bits, cur)?;
                let dispatch_async = bits.read_bit()?;
                let window_size = cur.u32()?;
                Command::ProducerInfo(ProducerInfo { header, producer_id, destination, dispatch_async, window_size })
            }
            tag::PRODUCER_ACK => {
                let producer_id = tight_read_opt_producer_id(bits, cur)?;
                let size = cur.u32()?;
                Command::ProducerAck(ProducerAck { header, producer_id, size })
            }
            tag::TRANSACTION_INFO => {
                let transaction_id = read_transaction_id(cur)?;
                let op = transaction_op_from_tag(cur.u8()?)?;
                Command::TransactionInfo(TransactionInfo { header, transaction_id, op })
            }
            tag::DESTINATION_INFO => {
                let connection_id = tight_read_opt_string(bits, cur)?.map(ConnectionId::new);
                let kind = destination_kind_from_tag(cur.u8()?)?;
                let physical = read_string(cur)?;
                let destination = Destination::parse(kind, &physical);
                let op = if bits.read_bit()? { DestinationOp::Add } else { DestinationOp::Remove };
                Command::DestinationInfo(DestinationInfo { header, connection_id, destination, op })
            }
            tag::REMOVE_INFO => {
                let connection_id = tight_read_opt_string(bits, cur)?.map(ConnectionId::new);
                let session_value = tight_read_opt_u64(bits, cur)?;
                let producer_value = tight_read_opt_u64(bits, cur)?;
                let consumer_value = tight_read_opt_u64(bits, cur)?;
                let last_delivered_sequence_id = tight_read_opt_u64(bits, cur)?;
                Command::RemoveInfo(RemoveInfo {
                    header,
                    connection_id,
                    session_value,
                    producer_value,
                    consumer_value,
                    last_delivered_sequence_id,
                })
            }
            tag::KEEP_ALIVE_INFO => Command::KeepAliveInfo(KeepAliveInfo { header }),
            tag::SHUTDOWN_INFO => Command::ShutdownInfo(ShutdownInfo { header }),
            tag::CONNECTION_CONTROL => {
                let close = bits.read_bit()?;
                let exit = bits.read_bit()?;
                let fail_over_urls = tight_read_opt_string(bits, cur)?;
                Command::ConnectionControl(ConnectionControl { header, close, exit, fail_over_urls })
            }
            tag::CONSUMER_CONTROL => {
                let consumer_id = tight_read_opt_consumer_id(bits, cur)?;
                let kind = consumer_control_kind_from_tag(cur.u8()?)?;
                let prefetch = tight_read_opt_u32(bits, cur)?;
                Command::ConsumerControl(ConsumerControl { header, consumer_id, kind, prefetch })
            }
            tag::MESSAGE => Command::Message(Box::new(self.unmarshal_message_tight(header, bits, cur)?)),
            tag::MESSAGE_ACK => {
                let consumer_id = tight_read_opt_consumer_id(bits, cur)?;
                let transaction_id = read_transaction_id(cur)?;
                let destination = self.tight_read_destination(bits, cur)?;
                let ack_type = ack_type_from_tag(cur.u8()?)?;
                let first_message_id = tight_read_opt_message_id(bits, cur)?;
                let last_message_id = tight_read_opt_message_id(bits, cur)?;
                let message_count = cur.u32()?;
                let poison_ack = bits.read_bit()?;
                Command::MessageAck(MessageAck {
                    header,
                    consumer_id,
                    transaction_id,
                    destination,
                    ack_type,
                    first_message_id,
                    last_message_id,
                    message_count,
                    poison_ack,
                })
            }
            tag::MESSAGE_DISPATCH => {
                let consumer_id = tight_read_opt_consumer_id(bits, cur)?;
                let destination = self.tight_read_destination(bits, cur)?;
                let has_message = bits.read_bit()?;
                let message =
                    if has_message { Some(self.unmarshal_message_tight(CommandHeader::default(), bits, cur)?) } else { None };
                let redelivery_counter = cur.u32()?;
                Command::MessageDispatch(Box::new(MessageDispatch {
                    header,
                    consumer_id,
                    destination,
                    message,
                    redelivery_counter,
                }))
            }
            tag::MESSAGE_PULL => {
                let consumer_id = tight_read_opt_consumer_id(bits, cur)?;
                let destination = self.tight_read_destination(bits, cur)?;
                let timeout_ms = cur.i64()?;
                Command::MessagePull(MessagePull { header, consumer_id, destination, timeout_ms })
            }
            tag::RESPONSE => Command::Response(Response { header, correlation_id: cur.u32()? }),
            tag::EXCEPTION_RESPONSE => {
                let correlation_id = cur.u32()?;
                let exception_class = tight_read_opt_string(bits, cur)?;
                let message = read_string(cur)?;
                let stack_trace = if self.options.stack_trace_enabled { tight_read_opt_string(bits, cur)? } else { None };
                Command::ExceptionResponse(ExceptionResponse {
                    header,
                    correlation_id,
                    exception_class,
                    message,
                    stack_trace,
                })
            }
            other => return Err(CodecError::UnknownTypeTag(other)),
        })
    }

    fn unmarshal_message_tight(
        &mut self,
        header: CommandHeader,
        bits: &mut BooleanStream,
        cur: &mut Reader<'_>,
    ) -> Result<Message, CodecError> {
        let message_id = tight_read_opt_message_id(bits, cur)?;
        let producer_id = tight_read_opt_producer_id(bits, cur)?;
        let destination = self.tight_read_destination(bits, cur)?;
        let reply_to = self.tight_read_destination(bits, cur)?;
        let transaction_id = read_transaction_id(cur)?;
        let persistent = bits.read_bit()?;
        let priority = cur.u8()?;
        let timestamp = cur.u64()?;
        let expiration = cur.u64()?;
        let correlation_id = tight_read_opt_string(bits, cur)?;
        let redelivery_counter = cur.u32()?;
        let compressed = bits.read_bit()?;
        let (properties, consumed) = primitives::read_map(cur.remaining())?;
        cur.take(consumed)?;
        let body_len = cur.u32()? as usize;
        let body = cur.take(body_len)?.to_vec();
        Ok(Message {
            header,
            message_id,
            producer_id,
            destination,
            reply_to,
            transaction_id,
            persistent,
            priority,
            timestamp,
            expiration,
            correlation_id,
            redelivery_counter,
            compressed,
            properties,
            body,
        })
    }
}

/// A cursor the codec's unmarshal path reads primitives from. Kept separate
/// from [`primitives::read_value`]'s internal cursor since this one also
/// needs to report how much of a nested region (e.g. the property map) it
/// consumed.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self { Self { buf, pos: 0 } }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> { Ok(self.take(1)?[0]) }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().map_err(|_| CodecError::Truncated)?))
    }

    fn i64(&mut self) -> Result<i64, CodecError> { Ok(self.u64()? as i64) }

    fn remaining(&self) -> &'a [u8] { &self.buf[self.pos..] }
}

fn write_header(out: &mut Vec<u8>, header: &CommandHeader) {
    write_u32(out, header.command_id);
    out.push(u8::from(header.response_required));
}

fn read_header(cur: &mut Reader<'_>) -> Result<CommandHeader, CodecError> {
    let command_id = cur.u32()?;
    let response_required = cur.u8()? != 0;
    Ok(CommandHeader { command_id, response_required })
}

fn write_u32(out: &mut Vec<u8>, v: u32) { out.extend_from_slice(&v.to_be_bytes()); }
fn write_u64(out: &mut Vec<u8>, v: u64) { out.extend_from_slice(&v.to_be_bytes()); }

fn write_opt_u32(out: &mut Vec<u8>, v: Option<u32>) {
    match v {
        Some(v) => {
            out.push(1);
            write_u32(out, v);
        }
        None => out.push(0),
    }
}

fn read_opt_u32(cur: &mut Reader<'_>) -> Result<Option<u32>, CodecError> {
    if cur.u8()? == 0 { Ok(None) } else { Ok(Some(cur.u32()?)) }
}

fn write_opt_u64(out: &mut Vec<u8>, v: Option<u64>) {
    match v {
        Some(v) => {
            out.push(1);
            write_u64(out, v);
        }
        None => out.push(0),
    }
}

fn read_opt_u64(cur: &mut Reader<'_>) -> Result<Option<u64>, CodecError> {
    if cur.u8()? == 0 { Ok(None) } else { Ok(Some(cur.u64()?)) }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    #[allow(clippy::cast_possible_truncation, reason = "string fields are bounded well under u32::MAX in practice")]
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn read_string(cur: &mut Reader<'_>) -> Result<String, CodecError> {
    let len = cur.u32()? as usize;
    let bytes = cur.take(len)?;
    std::str::from_utf8(bytes).map(str::to_owned).map_err(|_| CodecError::InvalidUtf8)
}

fn write_opt_string(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            out.push(1);
            write_string(out, s);
        }
        None => out.push(0),
    }
}

fn read_opt_string(cur: &mut Reader<'_>) -> Result<Option<String>, CodecError> {
    if cur.u8()? == 0 { Ok(None) } else { Ok(Some(read_string(cur)?)) }
}

fn write_producer_id(out: &mut Vec<u8>, id: &ProducerId) {
    write_string(out, id.connection_id.as_str());
    write_u64(out, id.session_value);
    write_u64(out, id.value);
}

fn read_producer_id(cur: &mut Reader<'_>) -> Result<ProducerId, CodecError> {
    let connection_id = ConnectionId::new(read_string(cur)?);
    let session_value = cur.u64()?;
    let value = cur.u64()?;
    Ok(ProducerId { connection_id, session_value, value })
}

fn write_opt_producer_id(out: &mut Vec<u8>, id: Option<&ProducerId>) {
    match id {
        Some(id) => {
            out.push(1);
            write_producer_id(out, id);
        }
        None => out.push(0),
    }
}

fn read_opt_producer_id(cur: &mut Reader<'_>) -> Result<Option<ProducerId>, CodecError> {
    if cur.u8()? == 0 { Ok(None) } else { Ok(Some(read_producer_id(cur)?)) }
}

fn write_consumer_id(out: &mut Vec<u8>, id: &ConsumerId) {
    write_string(out, id.connection_id.as_str());
    write_u64(out, id.session_value);
    write_u64(out, id.value);
}

fn read_consumer_id(cur: &mut Reader<'_>) -> Result<ConsumerId, CodecError> {
    let connection_id = ConnectionId::new(read_string(cur)?);
    let session_value = cur.u64()?;
    let value = cur.u64()?;
    Ok(ConsumerId { connection_id, session_value, value })
}

fn write_opt_consumer_id(out: &mut Vec<u8>, id: Option<&ConsumerId>) {
    match id {
        Some(id) => {
            out.push(1);
            write_consumer_id(out, id);
        }
        None => out.push(0),
    }
}

fn read_opt_consumer_id(cur: &mut Reader<'_>) -> Result<Option<ConsumerId>, CodecError> {
    if cur.u8()? == 0 { Ok(None) } else { Ok(Some(read_consumer_id(cur)?)) }
}

fn write_opt_message_id(out: &mut Vec<u8>, id: Option<&MessageId>) {
    match id {
        Some(id) => {
            out.push(1);
            write_producer_id(out, &id.producer_id);
            write_u64(out, id.producer_sequence_id);
            write_opt_u64(out, id.broker_sequence_id);
        }
        None => out.push(0),
    }
}

fn read_opt_message_id(cur: &mut Reader<'_>) -> Result<Option<MessageId>, CodecError> {
    if cur.u8()? == 0 {
        return Ok(None);
    }
    let producer_id = read_producer_id(cur)?;
    let producer_sequence_id = cur.u64()?;
    let broker_sequence_id = read_opt_u64(cur)?;
    Ok(Some(MessageId { producer_id, producer_sequence_id, broker_sequence_id }))
}

fn tight_write_opt_u32(bits: &mut BooleanStream, out: &mut Vec<u8>, v: Option<u32>) {
    bits.write_bit(v.is_some());
    if let Some(v) = v {
        write_u32(out, v);
    }
}

fn tight_read_opt_u32(bits: &mut BooleanStream, cur: &mut Reader<'_>) -> Result<Option<u32>, CodecError> {
    if bits.read_bit()? { Ok(Some(cur.u32()?)) } else { Ok(None) }
}

fn tight_write_opt_u64(bits: &mut BooleanStream, out: &mut Vec<u8>, v: Option<u64>) {
    bits.write_bit(v.is_some());
    if let Some(v) = v {
        write_u64(out, v);
    }
}

fn tight_read_opt_u64(bits: &mut BooleanStream, cur: &mut Reader<'_>) -> Result<Option<u64>, CodecError> {
    if bits.read_bit()? { Ok(Some(cur.u64()?)) } else { Ok(None) }
}

fn tight_write_opt_string(bits: &mut BooleanStream, out: &mut Vec<u8>, s: Option<&str>) {
    bits.write_bit(s.is_some());
    if let Some(s) = s {
        write_string(out, s);
    }
}

fn tight_read_opt_string(bits: &mut BooleanStream, cur: &mut Reader<'_>) -> Result<Option<String>, CodecError> {
    if bits.read_bit()? { Ok(Some(read_string(cur)?)) } else { Ok(None) }
}

fn tight_write_opt_producer_id(bits: &mut BooleanStream, out: &mut Vec<u8>, id: Option<&ProducerId>) {
    bits.write_bit(id.is_some());
    if let Some(id) = id {
        write_producer_id(out, id);
    }
}

fn tight_read_opt_producer_id(bits: &mut BooleanStream, cur: &mut Reader<'_>) -> Result<Option<ProducerId>, CodecError> {
    if bits.read_bit()? { Ok(Some(read_producer_id(cur)?)) } else { Ok(None) }
}

fn tight_write_opt_consumer_id(bits: &mut BooleanStream, out: &mut Vec<u8>, id: Option<&ConsumerId>) {
    bits.write_bit(id.is_some());
    if let Some(id) = id {
        write_consumer_id(out, id);
    }
}

fn tight_read_opt_consumer_id(bits: &mut BooleanStream, cur: &mut Reader<'_>) -> Result<Option<ConsumerId>, CodecError> {
    if bits.read_bit()? { Ok(Some(read_consumer_id(cur)?)) } else { Ok(None) }
}

/// The outer presence bit gates the whole [`MessageId`]; the inner
/// `broker_sequence_id` field is itself optional and gets its own bit.
fn tight_write_opt_message_id(bits: &mut BooleanStream, out: &mut Vec<u8>, id: Option<&MessageId>) {
    bits.write_bit(id.is_some());
    if let Some(id) = id {
        write_producer_id(out, &id.producer_id);
        write_u64(out, id.producer_sequence_id);
        tight_write_opt_u64(bits, out, id.broker_sequence_id);
    }
}

fn tight_read_opt_message_id(bits: &mut BooleanStream, cur: &mut Reader<'_>) -> Result<Option<MessageId>, CodecError> {
    if !bits.read_bit()? {
        return Ok(None);
    }
    let producer_id = read_producer_id(cur)?;
    let producer_sequence_id = cur.u64()?;
    let broker_sequence_id = tight_read_opt_u64(bits, cur)?;
    Ok(Some(MessageId { producer_id, producer_sequence_id, broker_sequence_id }))
}

fn write_transaction_id(out: &mut Vec<u8>, id: &TransactionId) {
    match id {
        TransactionId::None => out.push(0),
        TransactionId::Local(local) => {
            out.push(1);
            write_string(out, local.connection_id.as_str());
            write_u64(out, local.value);
        }
        TransactionId::Xa(xa) => {
            out.push(2);
            out.extend_from_slice(&xa.format_id.to_be_bytes());
            write_u32(out, u32::try_from(xa.global_tx_id.len()).unwrap_or(u32::MAX));
            out.extend_from_slice(&xa.global_tx_id);
            write_u32(out, u32::try_from(xa.branch_qualifier.len()).unwrap_or(u32::MAX));
            out.extend_from_slice(&xa.branch_qualifier);
        }
        TransactionId::Unspecified(tag) => {
            out.push(3);
            out.push(*tag);
        }
    }
}

fn read_transaction_id(cur: &mut Reader<'_>) -> Result<TransactionId, CodecError> {
    Ok(match cur.u8()? {
        0 => TransactionId::None,
        1 => {
            let connection_id = ConnectionId::new(read_string(cur)?);
            let value = cur.u64()?;
            TransactionId::Local(LocalTransactionId { connection_id, value })
        }
        2 => {
            let format_id = cur.u32()? as i32;
            let global_len = cur.u32()? as usize;
            let global_tx_id = cur.take(global_len)?.to_vec();
            let branch_len = cur.u32()? as usize;
            let branch_qualifier = cur.take(branch_len)?.to_vec();
            TransactionId::Xa(XaTransactionId { format_id, global_tx_id, branch_qualifier })
        }
        3 => TransactionId::Unspecified(cur.u8()?),
        other => return Err(CodecError::UnknownTypeTag(other)),
    })
}

const fn destination_kind_tag(dest: &Destination) -> u8 {
    match dest {
        Destination::Queue(_) => crate::command::tag::QUEUE,
        Destination::Topic(_) => crate::command::tag::TOPIC,
        Destination::TemporaryQueue(_) => crate::command::tag::TEMP_QUEUE,
        Destination::TemporaryTopic(_) => crate::command::tag::TEMP_TOPIC,
        Destination::Composite(_) => crate::command::tag::QUEUE,
    }
}

fn destination_kind_from_tag(tag: u8) -> Result<DestinationKind, CodecError> {
    use crate::command::tag as t;
    Ok(match tag {
        t::QUEUE => DestinationKind::Queue,
        t::TOPIC => DestinationKind::Topic,
        t::TEMP_QUEUE => DestinationKind::TemporaryQueue,
        t::TEMP_TOPIC => DestinationKind::TemporaryTopic,
        other => return Err(CodecError::UnknownTypeTag(other)),
    })
}

const fn ack_type_tag(kind: AckType) -> u8 {
    match kind {
        AckType::Auto => 0,
        AckType::Client => 1,
        AckType::DupsOk => 2,
        AckType::Individual => 3,
        AckType::Transacted => 4,
        AckType::Delivered => 5,
    }
}

fn ack_type_from_tag(tag: u8) -> Result<AckType, CodecError> {
    Ok(match tag {
        0 => AckType::Auto,
        1 => AckType::Client,
        2 => AckType::DupsOk,
        3 => AckType::Individual,
        4 => AckType::Transacted,
        5 => AckType::Delivered,
        other => return Err(CodecError::UnknownTypeTag(other)),
    })
}

const fn transaction_op_tag(op: TransactionOp) -> u8 {
    match op {
        TransactionOp::Begin => 0,
        TransactionOp::Commit => 1,
        TransactionOp::Rollback => 2,
        TransactionOp::End => 3,
        TransactionOp::Prepare => 4,
        TransactionOp::Forget => 5,
        TransactionOp::Recover => 6,
    }
}

fn transaction_op_from_tag(tag: u8) -> Result<TransactionOp, CodecError> {
    Ok(match tag {
        0 => TransactionOp::Begin,
        1 => TransactionOp::Commit,
        2 => TransactionOp::Rollback,
        3 => TransactionOp::End,
        4 => TransactionOp::Prepare,
        5 => TransactionOp::Forget,
        6 => TransactionOp::Recover,
        other => return Err(CodecError::UnknownTypeTag(other)),
    })
}

const fn consumer_control_kind_tag(kind: ConsumerControlKind) -> u8 {
    match kind {
        ConsumerControlKind::Start => 0,
        ConsumerControlKind::Stop => 1,
        ConsumerControlKind::Close => 2,
    }
}

fn consumer_control_kind_from_tag(tag: u8) -> Result<ConsumerControlKind, CodecError> {
    Ok(match tag {
        0 => ConsumerControlKind::Start,
        1 => ConsumerControlKind::Stop,
        2 => ConsumerControlKind::Close,
        other => return Err(CodecError::UnknownTypeTag(other)),
    })
}

/// Read a frame body from `r` and unmarshal it.
///
/// # Errors
/// Propagates I/O errors from the underlying reader or codec errors from
/// unmarshalling.
pub async fn read_command<R: AsyncRead + Unpin>(
    r: &mut R,
    format: &mut OpenWireFormat,
) -> Result<Command, CodecError> {
    let body = frame::read_frame(r, format.options.max_frame_size, frame::DEFAULT_IO_TIMEOUT).await?;
    format.unmarshal(&body)
}

/// Marshal `command` and write it as a frame to `w`.
///
/// # Errors
/// Propagates I/O errors from the underlying writer or codec errors from
/// marshalling.
pub async fn write_command<W: AsyncWrite + Unpin>(
    w: &mut W,
    format: &mut OpenWireFormat,
    command: &Command,
) -> Result<(), CodecError> {
    let body = format.marshal(command)?;
    frame::write_frame(w, &body, frame::DEFAULT_IO_TIMEOUT).await
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::command::{ConnectionInfo, ConsumerInfo};
    use crate::destination::Destination;
    use crate::ids::{ConnectionId, ConsumerId};

    fn sample_commands() -> Vec<Command> {
        vec![
            Command::ConnectionInfo(ConnectionInfo {
                header: CommandHeader::new(1, true),
                connection_id: ConnectionId::new("ID:host-1-0"),
                client_id: Some("client-1".into()),
                ..Default::default()
            }),
            Command::ConsumerInfo(ConsumerInfo {
                header: CommandHeader::new(2, true),
                consumer_id: ConsumerId { connection_id: ConnectionId::new("ID:host-1-0"), session_value: 1, value: 1 },
                destination: Some(Destination::Queue("orders".into())),
                ..Default::default()
            }),
            Command::KeepAliveInfo(KeepAliveInfo { header: CommandHeader::oneway(3) }),
        ]
    }

    #[rstest]
    fn round_trips_every_sample_command() {
        for cmd in sample_commands() {
            let mut format = OpenWireFormat::default();
            let bytes = format.marshal(&cmd).expect("marshal");
            let decoded = format.unmarshal(&bytes).expect("unmarshal");
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn destination_cache_is_transparent_across_repeated_sends() {
        let mut writer_format = OpenWireFormat::default();
        let mut reader_format = OpenWireFormat::default();
        let dest = Destination::Queue("repeated".into());

        for i in 0..3u32 {
            let cmd = Command::ConsumerInfo(ConsumerInfo {
                header: CommandHeader::new(i, false),
                consumer_id: ConsumerId {
                    connection_id: ConnectionId::new("ID:host-1-0"),
                    session_value: 1,
                    value: u64::from(i),
                },
                destination: Some(dest.clone()),
                ..Default::default()
            });
            let bytes = writer_format.marshal(&cmd).expect("marshal");
            let decoded = reader_format.unmarshal(&bytes).expect("unmarshal");
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let mut format = OpenWireFormat::default();
        let mut body = vec![250u8];
        write_header(&mut body, &CommandHeader::default());
        let err = format.unmarshal(&body).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTypeTag(250)));
    }

    fn loose_options() -> WireFormatOptions {
        WireFormatOptions { tight_encoding_enabled: false, cache_enabled: false, ..Default::default() }
    }

    #[rstest]
    fn round_trips_every_sample_command_under_loose_encoding() {
        for cmd in sample_commands() {
            let mut format = OpenWireFormat::new(loose_options());
            let bytes = format.marshal(&cmd).expect("marshal");
            let decoded = format.unmarshal(&bytes).expect("unmarshal");
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn tight_encoding_is_smaller_than_loose_for_a_sparse_command() {
        let cmd = Command::ConsumerInfo(ConsumerInfo {
            header: CommandHeader::new(1, false),
            consumer_id: ConsumerId { connection_id: ConnectionId::new("ID:host-1-0"), session_value: 1, value: 1 },
            destination: Some(Destination::Queue("orders".into())),
            ..Default::default()
        });

        let mut tight_format = OpenWireFormat::default();
        let tight_bytes = tight_format.marshal(&cmd).expect("tight marshal");

        let mut loose_format = OpenWireFormat::new(loose_options());
        let loose_bytes = loose_format.marshal(&cmd).expect("loose marshal");

        assert!(
            tight_bytes.len() < loose_bytes.len(),
            "tight ({}) should pack presence/boolean fields smaller than loose ({})",
            tight_bytes.len(),
            loose_bytes.len()
        );

        let mut decode_format = OpenWireFormat::default();
        assert_eq!(decode_format.unmarshal(&tight_bytes).expect("tight unmarshal"), cmd);
    }

    #[test]
    fn tight_destination_cache_is_transparent_across_repeated_sends() {
        let mut writer_format = OpenWireFormat::default();
        let mut reader_format = OpenWireFormat::default();
        let dest = Destination::Queue("tight-repeated".into());

        for i in 0..3u32 {
            let cmd = Command::ConsumerInfo(ConsumerInfo {
                header: CommandHeader::new(i, false),
                consumer_id: ConsumerId {
                    connection_id: ConnectionId::new("ID:host-1-0"),
                    session_value: 1,
                    value: u64::from(i),
                },
                destination: Some(dest.clone()),
                ..Default::default()
            });
            let bytes = writer_format.marshal(&cmd).expect("marshal");
            let decoded = reader_format.unmarshal(&bytes).expect("unmarshal");
            assert_eq!(decoded, cmd);
        }
    }
}
