//! Internal utilities shared between the client and server sides

pub(crate) use either::Either;
pub(crate) use inflight::InflightRequests;
pub(crate) use request_queue::RequestQueue;
pub(crate) use validation::validate_against_schema;

pub(crate) mod either;
pub(crate) mod inflight;
pub(crate) mod request_queue;
pub(crate) mod validation;
