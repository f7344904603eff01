//! Out of scope: the HTTP/WebSocket transport that would translate wire
//! traffic to `engine::ClientCommand`/`engine::EngineEvent`. Left as a
//! placeholder for the listener crate.
