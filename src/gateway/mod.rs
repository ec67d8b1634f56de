// Warden — Gateway Module
//
// Unix Domain Socket (UDS) server exposing the access service as
// newline-delimited JSON-RPC 2.0, with peer-process identification.

mod caller;
mod protocol;
mod uds;

pub use caller::CallerInfo;
pub use uds::UdsServer;
