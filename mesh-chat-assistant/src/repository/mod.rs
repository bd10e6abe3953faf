mod blob;
mod message;

pub use blob::BlobRepository;
pub use message::MessageRepository;
