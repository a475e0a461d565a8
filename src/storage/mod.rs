mod blob;
mod temp;
#[cfg(test)]
pub(crate) mod testing;
mod uri;

pub use blob::{BlobStore, TransferError};
pub use temp::TempVideo;
pub use uri::{UriError, VideoUri};
