//! Transport-agnostic forwarding core (C1-C4): media descriptors, the codec
//! matcher, track fan-out, the producer/consumer contracts, and the stream
//! registry that ties them together.

pub mod consumer;
pub mod matcher;
pub mod media;
pub mod producer;
pub mod registry;
pub mod relay;
pub mod stream;
pub mod track;

pub use consumer::Consumer;
pub use matcher::match_media;
pub use media::{Codec, CodecName, Direction, Kind, Media};
pub use producer::Producer;
pub use registry::{ProducerFactory, ResolvedProducer, StreamRegistry};
pub use stream::{PlaySource, Stream};
pub use track::{Subscriber, SubscriptionHandle, Track};
