pub mod error;
pub mod event;
pub mod frame;
pub mod header;
pub mod naming;

pub use error::{DecodeError, HeaderError};
pub use event::{EventDecoder, LogEvent, MdsEventDecoder, UpdateView};
pub use frame::{encode_frame, FRAME_HEADER_LEN, FRAME_OVERHEAD, FRAME_SENTINEL, FRAME_TRAILER_LEN};
pub use header::{Header, JournalLayout, DEFAULT_OBJECT_SIZE, JOURNAL_MAGIC};
pub use naming::{object_name, BASE_INO};
