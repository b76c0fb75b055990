//! Report authoring: the client of the server endpoints and the
//! capture → form → processing → result flow.

mod client;
mod flow;
mod media;

pub use client::{ReportClient, ReportError, DEFAULT_SERVER_URL};
pub use flow::{AsyncOp, PostRequest, ReportFlow, Step, Submission};
pub use media::{mime_from_path, MediaFile};
