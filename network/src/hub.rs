//! # Message Hub
//!
//! One [`Subscriber`] per message kind, all started, stopped, and broadcast
//! together. The transport hands [`load`](MessageHub::load) a `(kind, bytes)`
//! pair; the hub decodes against the kind's payload type and relays the
//! result — decoded value or decode error — to every waiter parked on that
//! kind. `Unknown` loads answer `NotFound` and touch nothing.
//!
//! The original of this design replicates the per-kind plumbing textually.
//! Here a single `macro_rules!` invocation stamps out the struct, the
//! lifecycle fan-outs, the dispatch match, and the typed `subscribe_*`
//! accessors. The `load` match is exhaustive over [`MessageKind`], so adding
//! a kind without wiring a hub slot is a compile error, not a runtime
//! surprise.

use crate::error::NetworkError;
use crate::message::{ByteReader, Decode, MessageKind};
use crate::subscriber::{DeliveryReceiver, Subscriber};

/// Decodes `input` as `T` and relays the outcome to `subscriber`.
///
/// Decode success relays `Ok(value)` and returns `Ok(())`; decode failure
/// relays the error to the same waiters and returns it to the caller, so
/// both sides of the hub see the identical code.
fn relay_decoded<T>(subscriber: &Subscriber<T>, input: &[u8]) -> Result<(), NetworkError>
where
    T: Decode + Clone,
{
    let mut reader = ByteReader::new(input);
    match T::decode(&mut reader) {
        Ok(value) => {
            subscriber.relay(Ok(value));
            Ok(())
        }
        Err(code) => {
            subscriber.relay(Err(code.clone()));
            Err(code)
        }
    }
}

macro_rules! message_hub {
    ($( $field:ident / $subscribe:ident => $kind:ident : $payload:ty ),+ $(,)?) => {
        /// The per-kind subscriber table. Effectively immutable after
        /// construction; every slot is individually thread-safe.
        pub struct MessageHub {
            $( $field: Subscriber<$payload>, )+
        }

        impl MessageHub {
            /// Creates a hub with a running subscriber for every kind.
            pub fn new() -> Self {
                Self {
                    $( $field: Subscriber::new(stringify!($field)), )+
                }
            }

            /// Starts every subscriber.
            pub fn start(&self) {
                $( self.$field.start(); )+
            }

            /// Stops every subscriber, draining outstanding waiters with
            /// `ServiceStopped`.
            pub fn stop(&self) {
                $( self.$field.stop(); )+
            }

            /// Relays `code` to every kind's outstanding waiters. Used at
            /// shutdown to wake pending reads with a terminal code.
            pub fn broadcast(&self, code: NetworkError) {
                $( self.$field.relay(Err(code.clone())); )+
            }

            /// Decodes `input` against `kind`'s payload type and delivers
            /// the outcome to that kind's subscribers.
            ///
            /// Returns the decode error when decoding fails, and `NotFound`
            /// for `Unknown` (with no subscriber touched).
            pub fn load(&self, kind: MessageKind, input: &[u8]) -> Result<(), NetworkError> {
                match kind {
                    $( MessageKind::$kind => relay_decoded(&self.$field, input), )+
                    MessageKind::Unknown => Err(NetworkError::NotFound),
                }
            }

            $(
                #[doc = concat!(
                    "Enqueues a waiter for the next `",
                    stringify!($field),
                    "` delivery."
                )]
                pub fn $subscribe(&self) -> DeliveryReceiver<$payload> {
                    self.$field.subscribe()
                }
            )+
        }

        impl Default for MessageHub {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

message_hub! {
    address / subscribe_address => Address : crate::message::Address,
    alert / subscribe_alert => Alert : crate::message::Alert,
    block / subscribe_block => Block : crate::message::Block,
    filter_add / subscribe_filter_add => FilterAdd : crate::message::FilterAdd,
    filter_clear / subscribe_filter_clear => FilterClear : crate::message::FilterClear,
    filter_load / subscribe_filter_load => FilterLoad : crate::message::FilterLoad,
    get_address / subscribe_get_address => GetAddress : crate::message::GetAddress,
    get_blocks / subscribe_get_blocks => GetBlocks : crate::message::GetBlocks,
    get_data / subscribe_get_data => GetData : crate::message::GetData,
    get_headers / subscribe_get_headers => GetHeaders : crate::message::GetHeaders,
    headers / subscribe_headers => Headers : crate::message::Headers,
    inventory / subscribe_inventory => Inventory : crate::message::Inventory,
    memory_pool / subscribe_memory_pool => MemoryPool : crate::message::MemoryPool,
    merkle_block / subscribe_merkle_block => MerkleBlock : crate::message::MerkleBlock,
    not_found / subscribe_not_found => NotFound : crate::message::NotFound,
    ping / subscribe_ping => Ping : crate::message::Ping,
    pong / subscribe_pong => Pong : crate::message::Pong,
    reject / subscribe_reject => Reject : crate::message::Reject,
    transaction / subscribe_transaction => Transaction : crate::message::Transaction,
    verack / subscribe_verack => Verack : crate::message::Verack,
    version / subscribe_version => Version : crate::message::Version,
}
