use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::packet::{display_code, CaptchaInfo, Packet};
use crate::session::registry::SessionRegistry;

/// Server-side packet handler.
///
/// Maps every inbound request to the registry operation it names and returns
/// the response to write back, if the request has one. Unknown codes never
/// fail: queries answer with absent fields and mutations are silent no-ops.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn dispatch(&self, packet: Packet) -> Option<Packet> {
        match packet {
            Packet::KeepAlive => Some(Packet::KeepAlive),

            Packet::NewCodeRequest => {
                let code = self.registry.allocate();
                debug!(code = %display_code(&code), "Allocated code");
                Some(Packet::NewCodeResponse { code })
            }

            Packet::NewCodeComplete { code, ticket } => {
                debug!(code = %display_code(&code), ticket_len = ticket.len(), "Ticket completed");
                self.registry.complete(code, ticket);
                None
            }

            Packet::QueryStatusRequest { code } => {
                // Unknown and pending codes look the same on the wire.
                let ticket = self.registry.query_status(&code).flatten();
                Some(Packet::QueryStatusResponse { code, ticket })
            }

            Packet::CodeInfoUpdate {
                code,
                captcha_type,
                captcha_data,
            } => {
                if !self
                    .registry
                    .update_captcha_info(&code, captcha_type, captcha_data)
                {
                    debug!(code = %display_code(&code), "Captcha update for unknown code ignored");
                }
                None
            }

            Packet::CodeInfoRefresh { code } => {
                if !self.registry.refresh(&code) {
                    debug!(code = %display_code(&code), "Refresh for unknown code ignored");
                }
                None
            }

            Packet::CodeInfoQuery { code } => {
                let info = self
                    .registry
                    .query_captcha_info(&code)
                    .unwrap_or(CaptchaInfo {
                        code,
                        captcha_type: 0,
                        captcha_data: None,
                    });
                Some(info.into())
            }

            Packet::NewCodeResponse { .. }
            | Packet::QueryStatusResponse { .. }
            | Packet::CodeInfoResponse { .. } => {
                warn!(kind = %packet.kind(), "Response packet sent to server, ignoring");
                None
            }
        }
    }
}
