use super::{take_with_category_cap, CandidateChannel, ChannelContext};
use crate::models::{Candidate, Channel};
use crate::services::scoring::{long_term_score, short_term_score};

/// Relevance blend for the personal pool. Session intent weighs in even
/// for users whose long-term profile is still empty.
const LONG_TERM_BLEND: f64 = 0.6;
const SHORT_TERM_BLEND: f64 = 0.4;

/// Personal channel: rank the universe by learned similarity.
#[derive(Default)]
pub struct PersonalChannel;

impl PersonalChannel {
    pub fn new() -> Self {
        Self
    }
}

impl CandidateChannel for PersonalChannel {
    fn channel(&self) -> Channel {
        Channel::Personal
    }

    fn generate(&self, ctx: &ChannelContext<'_>) -> Vec<Candidate> {
        let scored = ctx
            .universe
            .iter()
            .map(|item| {
                let lt = long_term_score(item, ctx.affinity, ctx.config);
                let st = short_term_score(item, ctx.session, ctx.config);
                (
                    LONG_TERM_BLEND * lt + SHORT_TERM_BLEND * st,
                    item.clone(),
                )
            })
            .collect();

        take_with_category_cap(
            scored,
            ctx.config.pools.personal,
            ctx.config.pools.category_cap_share,
            Channel::Personal,
        )
    }
}
