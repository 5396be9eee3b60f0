//! Side-channel bridge: the very first token delivery.
//!
//! Before bootstrap there is no channel into a sibling, so the hub piggybacks
//! its token on the launch request for the sibling's entry point. Which
//! launch facility carries it is host specific and hidden behind
//! [`SideChannel`]; the default rides in the usage-report slot of the launch
//! options.

use std::sync::Arc;

use shuttle_wire::{ContextId, IssueMode, LaunchOptions, Payload, SlotId, Token, USAGE_TIME_REPORT};
use tracing::{error, info, warn};

use crate::error::ShuttleError;
use crate::host::TokenHost;
use crate::locker::Locker;

/// Carries a token inside launch options.
pub trait SideChannel: Send + Sync {
    /// Launch options that carry `token`.
    fn attach(&self, token: Token) -> LaunchOptions;

    /// The token carried by `options`, if the host populated the slot.
    fn extract(&self, options: &LaunchOptions) -> Option<Token>;
}

/// Uses the launch-option slot reserved for usage-time reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageReportSideChannel;

impl SideChannel for UsageReportSideChannel {
    fn attach(&self, token: Token) -> LaunchOptions {
        LaunchOptions::new().with(USAGE_TIME_REPORT, Payload::Token(token))
    }

    fn extract(&self, options: &LaunchOptions) -> Option<Token> {
        match options.get(USAGE_TIME_REPORT)? {
            Payload::Token(token) => Some(token.clone()),
            _ => None,
        }
    }
}

/// Sibling half of the handshake.
pub struct Bridge {
    context: ContextId,
    tokens: Arc<dyn TokenHost>,
    locker: Locker,
    side_channel: Arc<dyn SideChannel>,
}

impl Bridge {
    pub fn new(
        tokens: Arc<dyn TokenHost>,
        locker: Locker,
        side_channel: Arc<dyn SideChannel>,
    ) -> Self {
        Self {
            context: locker.context(),
            tokens,
            locker,
            side_channel,
        }
    }

    /// Complete the handshake from the options this context's entry point was
    /// launched with.
    ///
    /// Saves the carried token as the channel into its issuer, then sends a
    /// fresh reverse token back over it. Returns the carried token, or `None`
    /// when the launch carried none (a normal launch, or a host that did not
    /// populate the slot).
    pub fn retrieve(&self, options: Option<&LaunchOptions>) -> Option<Token> {
        let shuttle = self.side_channel.extract(options?)?;
        let owner = shuttle.issuer;

        match self.locker.save(owner, shuttle.clone()) {
            Ok(()) => {}
            // The locker already reported the rejected token.
            Err(ShuttleError::InvalidArgument { .. }) => return None,
            Err(e) => {
                warn!(context = %self.context, owner = %owner, error = %e, "Failed to save shuttle");
                return None;
            }
        }

        let Some(reverse) =
            self.tokens
                .issue(SlotId::shuttle(self.context), None, IssueMode::CreateIfAbsent)
        else {
            error!(context = %self.context, "Host refused to issue a reverse shuttle");
            return Some(shuttle);
        };

        info!(context = %self.context, owner = %owner, "Returning reverse shuttle");
        if let Err(e) = self.tokens.send(&shuttle, Some(Payload::Token(reverse))) {
            warn!(context = %self.context, owner = %owner, error = %e, "Reverse shuttle send failed");
        }
        Some(shuttle)
    }
}
