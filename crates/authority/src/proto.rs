//! Wire messages of the agreement service.
//!
//! ```proto
//! service AgreementService {
//!   rpc GetSignedStatus(GetSignedStatusRequest) returns (GetSignedStatusResponse);
//! }
//! ```

/// Fully qualified method path of `GetSignedStatus`.
pub const GET_SIGNED_STATUS_PATH: &str = "/agreement.v1.AgreementService/GetSignedStatus";

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetSignedStatusRequest {
    #[prost(string, tag = "1")]
    pub github_username: String,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct GetSignedStatusResponse {
    #[prost(bool, tag = "1")]
    pub has_signed: bool,
}
