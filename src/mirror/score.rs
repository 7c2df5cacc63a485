//! Score extraction

use super::reaction::ReactionKind;
use serenity::all::ChannelId;
use std::collections::BTreeSet;

/// Number of reactions which feed the decision engine.
pub const SCORED_COUNT: usize = 3;

/// Per-index reaction counts, in the order of [`ScoreSpec::scored`].
pub type ScoreVector = [u64; SCORED_COUNT];

/// One scored reaction and where messages winning with it get mirrored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoredReaction {
    pub reaction: ReactionKind,
    /// `None` if the target is not configured; such a target is skipped.
    pub target_channel: Option<ChannelId>,
}

/// Which reactions count, in which order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreSpec {
    pub scored: [ScoredReaction; SCORED_COUNT],
    /// Seeded alongside the scored reactions but never counted.
    pub neutral: Option<ReactionKind>,
}

impl ScoreSpec {
    /// Map winning indices to their target channels.
    pub fn targets_for(&self, indices: &BTreeSet<usize>) -> BTreeSet<ChannelId> {
        indices
            .iter()
            .filter_map(|&i| self.scored.get(i))
            .filter_map(|scored| scored.target_channel)
            .collect()
    }

    /// Every target channel that is configured.
    pub fn all_targets(&self) -> BTreeSet<ChannelId> {
        self.scored
            .iter()
            .filter_map(|scored| scored.target_channel)
            .collect()
    }

    /// Reactions the bot seeds onto new posts: scored ones in order, then the neutral one.
    pub fn seed_reactions(&self) -> Vec<&ReactionKind> {
        self.scored
            .iter()
            .map(|scored| &scored.reaction)
            .chain(self.neutral.iter())
            .collect()
    }
}

/// Look up the current count of each scored reaction, 0 if absent.
///
/// `reactions` must already be normalized; see [`ReactionKind::from_reaction_type`].
pub fn extract(reactions: &[(ReactionKind, u64)], spec: &ScoreSpec) -> ScoreVector {
    let mut scores = [0; SCORED_COUNT];
    for (score, scored) in scores.iter_mut().zip(spec.scored.iter()) {
        *score = reactions
            .iter()
            .find(|(kind, _)| *kind == scored.reaction)
            .map_or(0, |(_, count)| *count);
    }
    scores
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serenity::all::EmojiId;

    pub fn spec() -> ScoreSpec {
        ScoreSpec {
            scored: [
                ScoredReaction {
                    reaction: ReactionKind::Standard("\u{1F44D}".to_owned()),
                    target_channel: Some(ChannelId::new(100)),
                },
                ScoredReaction {
                    reaction: ReactionKind::Custom(EmojiId::new(7)),
                    target_channel: Some(ChannelId::new(101)),
                },
                ScoredReaction {
                    reaction: ReactionKind::Standard("\u{1F602}".to_owned()),
                    target_channel: Some(ChannelId::new(102)),
                },
            ],
            neutral: Some(ReactionKind::Standard("\u{1F937}".to_owned())),
        }
    }

    #[test]
    fn extract_counts_in_spec_order() {
        let spec = spec();
        let reactions = vec![
            (ReactionKind::Standard("\u{1F602}".to_owned()), 4),
            (ReactionKind::Custom(EmojiId::new(7)), 2),
            (ReactionKind::Standard("\u{1F937}".to_owned()), 9),
        ];
        assert_eq!(extract(&reactions, &spec), [0, 2, 4]);
    }

    #[test]
    fn extract_ignores_unscored_reactions() {
        let spec = spec();
        let reactions = vec![
            (ReactionKind::Standard("\u{1F525}".to_owned()), 12),
            (ReactionKind::Custom(EmojiId::new(8)), 3),
        ];
        assert_eq!(extract(&reactions, &spec), [0, 0, 0]);
        assert_eq!(extract(&[], &spec), [0, 0, 0]);
    }

    #[test]
    fn targets_skip_unconfigured_and_dedupe() {
        let mut spec = spec();
        spec.scored[1].target_channel = None;
        spec.scored[2].target_channel = Some(ChannelId::new(100));

        let all: BTreeSet<usize> = [0, 1, 2].into_iter().collect();
        assert_eq!(
            spec.targets_for(&all),
            [ChannelId::new(100)].into_iter().collect()
        );
        assert_eq!(spec.all_targets().len(), 1);
    }

    #[test]
    fn seed_order_puts_neutral_last() {
        let spec = spec();
        let seeds = spec.seed_reactions();
        assert_eq!(seeds.len(), 4);
        assert_eq!(seeds[1], &ReactionKind::Custom(EmojiId::new(7)));
        assert_eq!(seeds[3], &ReactionKind::Standard("\u{1F937}".to_owned()));
    }
}
