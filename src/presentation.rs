use serde::Serialize;

use crate::mood::MoodState;

/// face and caption shown for a mood on the oled and the live page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub glyph: &'static str,
    pub phrase: &'static str,
}

const NEUTRAL: Presentation = Presentation { glyph: "-_-", phrase: "I'm OK" };

pub fn present(mood: MoodState) -> Presentation {
    match mood {
        MoodState::Happy => Presentation { glyph: "^_^", phrase: "I'm Happy!" },
        MoodState::Thirsty => Presentation { glyph: "O_O", phrase: "I'm Thirsty" },
        MoodState::Drowning => Presentation { glyph: "@_@", phrase: "Too Wet!" },
        MoodState::Hot => Presentation { glyph: ">_<", phrase: "Too Hot!" },
        MoodState::Neutral => NEUTRAL,
    }
}

/// Presentation for a wire label. Labels this build doesn't know (older
/// log history, a newer hub) get the neutral face instead of an error.
pub fn present_label(label: &str) -> Presentation {
    label.parse::<MoodState>().map(present).unwrap_or(NEUTRAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mood_has_a_distinct_face() {
        let faces: std::collections::HashSet<_> =
            MoodState::ALL.into_iter().map(|m| present(m).glyph).collect();
        assert_eq!(faces.len(), MoodState::ALL.len());
    }

    #[test]
    fn known_pairs() {
        assert_eq!(present(MoodState::Thirsty).phrase, "I'm Thirsty");
        assert_eq!(present(MoodState::Hot).glyph, ">_<");
    }

    #[test]
    fn unknown_label_falls_back_to_neutral() {
        assert_eq!(present_label("sleepy"), present(MoodState::Neutral));
        assert_eq!(present_label(""), present(MoodState::Neutral));
        assert_eq!(present_label("drowning"), present(MoodState::Drowning));
    }
}
