//! Messages exchanged between connectors and data trustees

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::participant::Participant;

/// Message body returned when the whitelists have no trustee in common
pub const NO_COMMON_TRUSTEE: &str = "No commonly trusted data trustee found";

// =============================================================================
// Negotiation
// =============================================================================

/// Sent by the initiating connector to the counterparty's `receive-negotiation` endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationRequest {
    /// Connector that owns the data
    pub data_source: Participant,
    /// Connector that receives the data
    pub data_sink: Participant,
    /// The initiator's whitelist
    pub trusted_data_trustees: Vec<Participant>,
    /// Assets to be exchanged
    pub assets: Vec<String>,
    /// Hash of `trusted_data_trustees`, checked by the receiver
    pub hash: String,
}

/// Successful negotiation outcome naming the chosen trustee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResponse {
    pub data_source: Participant,
    pub data_sink: Participant,
    pub trusted_data_trustee: Participant,
    pub assets: Vec<String>,
}

/// Any body a counterparty may answer a negotiation with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NegotiationReply {
    /// A commonly trusted trustee was chosen
    Matched(NegotiationResponse),
    /// No trustee in common; `trustedDataTrustee` is always an empty list
    Unmatched {
        #[serde(rename = "trustedDataTrustee", default)]
        trusted_data_trustee: Vec<Participant>,
        message: String,
    },
    /// The counterparty rejected the request
    Failed { error: String },
}

impl NegotiationReply {
    /// Reply used when no trustee is trusted by both sides
    pub fn unmatched() -> Self {
        Self::Unmatched {
            trusted_data_trustee: Vec::new(),
            message: NO_COMMON_TRUSTEE.to_string(),
        }
    }

    /// The chosen trustee, if it can be reached
    pub fn chosen_trustee(&self) -> Option<&Participant> {
        match self {
            Self::Matched(response) if response.trusted_data_trustee.has_url() => {
                Some(&response.trusted_data_trustee)
            }
            _ => None,
        }
    }
}

// =============================================================================
// Trustee Notifications
// =============================================================================

/// Which side of the exchange sent a trustee notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderRole {
    Provider,
    Consumer,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Consumer => "consumer",
        }
    }

    /// Parse a sender type, ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("provider") {
            Some(Self::Provider)
        } else if value.eq_ignore_ascii_case("consumer") {
            Some(Self::Consumer)
        } else {
            None
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sent by both negotiating connectors to the chosen trustee's `notify` endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataTrusteeRequest {
    pub data_source: Participant,
    pub data_sink: Participant,
    pub assets: Vec<String>,
    /// `"provider"` or `"consumer"`
    pub sender_type: String,
}

impl DataTrusteeRequest {
    pub fn new(
        data_source: Participant,
        data_sink: Participant,
        assets: Vec<String>,
        sender: SenderRole,
    ) -> Self {
        Self {
            data_source,
            data_sink,
            assets,
            sender_type: sender.as_str().to_string(),
        }
    }

    /// The sender role, if the sender type is recognised
    pub fn sender(&self) -> Option<SenderRole> {
        SenderRole::parse(&self.sender_type)
    }
}

impl fmt::Display for DataTrusteeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataTrusteeRequest[dataSource={}, dataSink={}, assets={:?}, senderType={}]",
            self.data_source, self.data_sink, self.assets, self.sender_type
        )
    }
}

/// Sent by the trustee to both parties once an exchange has completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CompletionNotice {
    pub message: String,
    pub role: String,
}

// =============================================================================
// Whitelist Listing
// =============================================================================

/// Whitelist snapshot together with its hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrustedParticipantsResponse {
    pub participants: Vec<Participant>,
    pub hash: String,
}
