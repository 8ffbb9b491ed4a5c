//! Passages to type.
//!
//! The room asks a [`ContentProvider`] for a passage it has not shown yet.
//! When the provider runs dry the room falls back on its own history, and
//! as a last resort on [`FALLBACK_TEXT`], so starting a round never fails.

use std::collections::HashMap;

use keyrace_protocol::Difficulty;
use rand::RngCore;
use rand::seq::IndexedRandom;

/// Used when neither the provider nor the room's history has a passage.
pub const FALLBACK_TEXT: &str = "The quick brown fox jumps over the lazy dog while the \
     five boxing wizards jump quickly and a sphinx of black quartz judges my vow.";

/// Source of passages for rounds.
pub trait ContentProvider: Send + Sync + 'static {
    /// A passage of `difficulty` that is not in `shown`, or `None` when
    /// every passage of that difficulty has been shown.
    fn passage(
        &self,
        difficulty: Difficulty,
        shown: &[String],
        rng: &mut dyn RngCore,
    ) -> Option<String>;
}

/// Built-in passages grouped by difficulty.
#[derive(Debug, Clone)]
pub struct ParagraphBank {
    pools: HashMap<Difficulty, Vec<String>>,
}

impl ParagraphBank {
    /// A bank with no passages at all.
    pub fn empty() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Replaces the pool for one difficulty.
    pub fn with_passages<I, S>(mut self, difficulty: Difficulty, passages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pools
            .insert(difficulty, passages.into_iter().map(Into::into).collect());
        self
    }

    pub fn len(&self, difficulty: Difficulty) -> usize {
        self.pools.get(&difficulty).map_or(0, Vec::len)
    }
}

impl Default for ParagraphBank {
    fn default() -> Self {
        Self::empty()
            .with_passages(
                Difficulty::Easy,
                [
                    "The sun was warm and the grass was green. A small dog ran across the \
                     yard to meet the kids as they came home from school.",
                    "We packed a lunch and went to the lake. The water was calm, so we sat \
                     on the dock and watched the boats go by.",
                    "My cat likes to sleep by the window. When a bird lands on the tree \
                     outside, she wakes up and watches it for a long time.",
                    "It rained all day, so we stayed inside and played cards. Later we made \
                     soup and read books until it was time for bed.",
                ],
            )
            .with_passages(
                Difficulty::Medium,
                [
                    "Typing quickly is less about speed than about rhythm. Once your fingers \
                     learn where each key lives, accuracy follows, and the speed arrives on \
                     its own after a few weeks of steady practice.",
                    "The old lighthouse keeper climbed the spiral stairs every evening, \
                     trimming the wick and polishing the lens so that ships passing the \
                     rocky headland would find their way home safely.",
                    "Markets open early in the coastal town. Fishermen unload crates of \
                     silver mackerel while bakers stack warm loaves, and by seven o'clock \
                     the square is loud with bargaining voices.",
                    "A good map tells you where you are; a great one tells you what you \
                     might find. Explorers trusted both, yet still carried a compass for \
                     the moments when the paper disagreed with the hills.",
                ],
            )
            .with_passages(
                Difficulty::Hard,
                [
                    "Quantum entanglement, famously dismissed by Einstein as \"spooky action \
                     at a distance,\" has since been verified in experiments spanning over \
                     1,200 kilometres; its implications for cryptography (and for our \
                     intuitions about locality) remain profound.",
                    "In 1854, Dr. John Snow traced a cholera outbreak in Soho to a single \
                     water pump on Broad Street. By mapping 578 deaths, he challenged the \
                     prevailing miasma theory and laid the groundwork for epidemiology.",
                    "Asynchronous runtimes multiplex thousands of tasks onto a handful of \
                     OS threads: each `await` yields control, the executor polls whichever \
                     future is ready, and wakers (not busy loops) signal progress.",
                    "The committee's 42-page report, released on 03/11, recommended \
                     \"immediate, measurable action\" on emissions; critics, however, noted \
                     that its targets lagged 15-20% behind peer-reviewed projections.",
                ],
            )
    }
}

impl ContentProvider for ParagraphBank {
    fn passage(
        &self,
        difficulty: Difficulty,
        shown: &[String],
        rng: &mut dyn RngCore,
    ) -> Option<String> {
        let fresh: Vec<&String> = self
            .pools
            .get(&difficulty)?
            .iter()
            .filter(|p| !shown.contains(p))
            .collect();
        fresh.choose(rng).map(|p| (*p).clone())
    }
}
