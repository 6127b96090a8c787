pub mod recorder;
pub mod wav;

pub use recorder::{CpalRecorder, FileRecorder, Recorder};
pub use wav::{encode_wav, AudioFile};
