pub mod queue;
pub mod sink;

pub use queue::{AudioFragment, PlaybackQueue, QueueSnapshot};
pub use sink::{describe_wav, AudioSink, DirectorySink, RodioSink, WavInfo};
