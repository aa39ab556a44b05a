pub(crate) mod request;
pub(crate) mod response;

pub use request::{Method, Request};
pub use response::{Response, ResponseRecorder, ResponseSink};
