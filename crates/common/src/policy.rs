use serde::{Deserialize, Serialize};

/// Layer composition selection for the hybrid engine.
///
/// Both compositions keep the KEM on the outside and the one-time pad as the
/// innermost layer; the three-layer variant inserts AES-256-GCM between them
/// so confidentiality survives the loss of any single primitive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LayerPolicy {
    /// KEM + OTP.
    TwoLayer,
    /// KEM + AEAD + OTP.
    ThreeLayer,
}

impl Default for LayerPolicy {
    fn default() -> Self {
        LayerPolicy::TwoLayer
    }
}

impl LayerPolicy {
    /// Whether the AEAD sub-layer participates.
    pub fn use_aead(&self) -> bool {
        matches!(self, LayerPolicy::ThreeLayer)
    }

    pub fn from_use_aead(use_aead: bool) -> Self {
        if use_aead {
            LayerPolicy::ThreeLayer
        } else {
            LayerPolicy::TwoLayer
        }
    }

    /// Layer suffix for envelope algorithm labels.
    pub fn layer_label(&self) -> &'static str {
        match self {
            LayerPolicy::TwoLayer => "OTP",
            LayerPolicy::ThreeLayer => "AES-256-GCM+OTP",
        }
    }
}
