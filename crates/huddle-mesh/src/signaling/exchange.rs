//! Exchange codes for relay-less signaling.
//!
//! A code is standard base64 over a JSON object holding one session
//! description and every candidate gathered for it. It is treated as an
//! atomic blob: it either decodes completely or the exchange fails.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use crate::error::ExchangeCodeError;
use crate::protocol::{IceCandidateInit, SdpType, SessionDescription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeCode {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
    #[serde(default)]
    pub candidates: Vec<IceCandidateInit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ExchangeCode {
    pub fn new(description: SessionDescription, candidates: Vec<IceCandidateInit>) -> Self {
        Self {
            kind: description.kind,
            sdp: description.sdp,
            candidates,
            participant_id: None,
            display_name: None,
        }
    }

    pub fn with_sender(mut self, participant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.participant_id = Some(participant_id.into());
        self.display_name = Some(display_name.into());
        self
    }

    pub fn description(&self) -> SessionDescription {
        SessionDescription {
            kind: self.kind,
            sdp: self.sdp.clone(),
        }
    }

    pub fn encode(&self) -> Result<String, ExchangeCodeError> {
        let json = serde_json::to_vec(self).map_err(|e| ExchangeCodeError::Json(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a pasted code. Surrounding whitespace is ignored.
    pub fn decode(code: &str) -> Result<Self, ExchangeCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ExchangeCodeError::Empty);
        }
        let bytes = STANDARD
            .decode(code)
            .map_err(|e| ExchangeCodeError::Base64(e.to_string()))?;
        let decoded: ExchangeCode =
            serde_json::from_slice(&bytes).map_err(|e| ExchangeCodeError::Json(e.to_string()))?;
        if decoded.sdp.trim().is_empty() {
            return Err(ExchangeCodeError::Json("empty sdp".into()));
        }
        Ok(decoded)
    }

    /// The encoded code as a terminal QR code.
    pub fn to_qr(&self) -> Result<Option<String>, ExchangeCodeError> {
        Ok(render_qr(&self.encode()?))
    }

    pub fn expect_kind(self, expected: SdpType) -> Result<Self, ExchangeCodeError> {
        if self.kind == expected {
            Ok(self)
        } else {
            Err(ExchangeCodeError::WrongType {
                expected: expected.as_str(),
                found: self.kind.as_str(),
            })
        }
    }
}

/// Light border, in modules, that scanners need around the symbol.
const QUIET_ZONE: usize = 2;

/// Render data as a terminal QR code: Unicode half blocks, two module rows
/// per line, inside a light quiet zone. Low error correction keeps a full
/// SDP code within QR capacity. `None` when the data still does not fit.
pub fn render_qr(data: &str) -> Option<String> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L).ok()?;
    let width = code.width();
    let colors = code.to_colors();
    let side = width + 2 * QUIET_ZONE;

    let dark = |x: usize, y: usize| {
        let (Some(x), Some(y)) = (x.checked_sub(QUIET_ZONE), y.checked_sub(QUIET_ZONE)) else {
            return false;
        };
        x < width && y < width && colors[y * width + x] == Color::Dark
    };

    let mut out = String::new();
    for y in (0..side).step_by(2) {
        out.extend((0..side).map(|x| match (dark(x, y), dark(x, y + 1)) {
            (true, true) => '█',
            (true, false) => '▀',
            (false, true) => '▄',
            (false, false) => ' ',
        }));
        out.push('\n');
    }
    Some(out)
}
