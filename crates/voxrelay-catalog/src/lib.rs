//! Static keyword → phrase-set lookup selecting contextual "initial" and
//! "keep-alive" fillers for a voice turn.
//!
//! All phrases end with a literal trailing space — required by the
//! downstream TTS so word boundaries stay clean when the filler is
//! concatenated with whatever follows it on the wire.

use once_cell::sync::Lazy;
use rand::Rng;
use std::sync::Mutex;

/// One keyword category: a set of trigger keywords plus the phrase pools
/// used while waiting on the LLM for that category.
pub struct PhraseCategory {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub initial: &'static [&'static str],
    pub keep_alive: &'static [&'static str],
}

/// Compile-time category table. Order defines match priority — the first
/// category whose keyword list has a substring hit wins. `FALLBACK` has no
/// keywords and is returned when nothing else matches.
pub static CATEGORIES: &[PhraseCategory] = &[
    PhraseCategory {
        name: "email",
        keywords: &["email", "inbox", "mail"],
        initial: &[
            "Checking your inbox... ",
            "Pulling up your emails... ",
            "Let me look at your mail... ",
        ],
        keep_alive: &["Still digging through your inbox... ", "Almost there with your email... "],
    },
    PhraseCategory {
        name: "calendar",
        keywords: &["calendar", "schedule", "meeting", "appointment"],
        initial: &[
            "Checking your calendar... ",
            "Let me look at your schedule... ",
            "Pulling up your events... ",
        ],
        keep_alive: &["Still checking your calendar... ", "One moment on your schedule... "],
    },
    PhraseCategory {
        name: "weather",
        keywords: &["weather", "forecast", "temperature", "rain"],
        initial: &["Checking the weather... ", "Let me pull up the forecast... "],
        keep_alive: &["Still checking the forecast... "],
    },
    PhraseCategory {
        name: "messaging",
        keywords: &["text", "message", "sms", "imessage"],
        initial: &["Pulling up your messages... ", "Checking your texts... "],
        keep_alive: &["Still looking at your messages... "],
    },
    PhraseCategory {
        name: "tasks",
        keywords: &["task", "to-do", "todo", "reminder list"],
        initial: &["Checking your task list... ", "Let me look at your to-dos... "],
        keep_alive: &["Still working through your tasks... "],
    },
    PhraseCategory {
        name: "health",
        keywords: &["heart rate", "steps", "sleep", "workout", "health"],
        initial: &["Checking your health data... ", "Pulling up your stats... "],
        keep_alive: &["Still looking at your health data... "],
    },
    PhraseCategory {
        name: "crypto",
        keywords: &["bitcoin", "crypto", "ethereum", "portfolio"],
        initial: &["Checking the markets... ", "Pulling up your portfolio... "],
        keep_alive: &["Still checking the markets... "],
    },
    PhraseCategory {
        name: "search",
        keywords: &["search", "look up", "google", "find out"],
        initial: &["Searching for that... ", "Let me look that up... "],
        keep_alive: &["Still searching... ", "Digging a bit deeper... "],
    },
    PhraseCategory {
        name: "code",
        keywords: &["code", "function", "bug", "repository", "commit"],
        initial: &["Looking at the code... ", "Let me check that... "],
        keep_alive: &["Still working through the code... "],
    },
    PhraseCategory {
        name: "notes",
        keywords: &["note", "notes"],
        initial: &["Checking your notes... ", "Pulling up your notes... "],
        keep_alive: &["Still looking at your notes... "],
    },
    PhraseCategory {
        name: "browser",
        keywords: &["browser", "website", "webpage", "tab"],
        initial: &["Checking the browser... ", "Let me pull that page up... "],
        keep_alive: &["Still loading that page... "],
    },
    PhraseCategory {
        name: "memory",
        keywords: &["remember", "recall", "memory"],
        initial: &["Let me recall that... ", "Checking what I remember... "],
        keep_alive: &["Still thinking back... "],
    },
    PhraseCategory {
        name: "file",
        keywords: &["file", "document", "folder", "download"],
        initial: &["Checking your files... ", "Pulling up that document... "],
        keep_alive: &["Still looking through your files... "],
    },
    PhraseCategory {
        name: "music",
        keywords: &["song", "music", "playlist", "play"],
        initial: &["Queuing that up... ", "Let me find that song... "],
        keep_alive: &["Still finding that track... "],
    },
    PhraseCategory {
        name: "image",
        keywords: &["photo", "picture", "image", "screenshot"],
        initial: &["Checking your photos... ", "Pulling up that image... "],
        keep_alive: &["Still looking through your photos... "],
    },
    PhraseCategory {
        name: "voice",
        keywords: &["voicemail", "call log", "voice memo"],
        initial: &["Checking your voicemail... ", "Pulling up your calls... "],
        keep_alive: &["Still checking that... "],
    },
    PhraseCategory {
        name: "whatsapp",
        keywords: &["whatsapp"],
        initial: &["Checking WhatsApp... ", "Pulling up your WhatsApp chats... "],
        keep_alive: &["Still checking WhatsApp... "],
    },
    PhraseCategory {
        name: "twitter",
        keywords: &["twitter", "tweet", "x.com"],
        initial: &["Checking that... ", "Let me pull that up... "],
        keep_alive: &["Still checking... "],
    },
];

/// Used when no category's keywords match. Has no keywords of its own, so
/// it is never returned by `match_category`'s keyword scan — only as the
/// explicit fallback.
pub static FALLBACK: PhraseCategory = PhraseCategory {
    name: "fallback",
    keywords: &[],
    initial: &["One sec... ", "Let me check on that... ", "Working on it... "],
    keep_alive: &["Still working on that... ", "Almost there... "],
};

/// Process-global memory of the last initial phrase handed out, so two
/// back-to-back turns never repeat the same filler. Deliberately a single
/// slot shared across all sessions and categories: a race under concurrency
/// only risks a repeated phrase, which is cosmetic, and a per-session
/// counter would defeat the point of variety across a session's own
/// consecutive turns.
static LAST_INITIAL: Lazy<Mutex<Option<&'static str>>> = Lazy::new(|| Mutex::new(None));

/// All configured categories, in match-priority order. Exposed so the
/// gateway's `/health` endpoint can report catalog size.
pub fn categories() -> &'static [PhraseCategory] {
    CATEGORIES
}

/// Lowercase `text` and return the first category whose keyword list has a
/// substring hit, in table order; otherwise `FALLBACK`.
pub fn match_category(text: &str) -> &'static PhraseCategory {
    let lower = text.to_lowercase();
    CATEGORIES
        .iter()
        .find(|cat| cat.keywords.iter().any(|kw| lower.contains(kw)))
        .unwrap_or(&FALLBACK)
}

/// Pick an initial filler phrase for `category`, uniformly at random but
/// never equal to the phrase most recently handed out — unless the
/// category only has one phrase, in which case repetition is unavoidable
/// and allowed.
pub fn pick_initial(category: &PhraseCategory) -> &'static str {
    if category.initial.len() <= 1 {
        let phrase = category.initial.first().copied().unwrap_or("One sec... ");
        *LAST_INITIAL.lock().unwrap() = Some(phrase);
        return phrase;
    }

    let mut last = LAST_INITIAL.lock().unwrap();
    let mut rng = rand::rng();
    let phrase = loop {
        let idx = rng.random_range(0..category.initial.len());
        let candidate = category.initial[idx];
        if Some(candidate) != *last {
            break candidate;
        }
    };
    *last = Some(phrase);
    phrase
}

/// Deterministic round-robin keep-alive phrase for `category`.
pub fn pick_keep_alive(category: &PhraseCategory, counter: usize) -> &'static str {
    let len = category.keep_alive.len().max(1);
    category
        .keep_alive
        .get(counter % len)
        .copied()
        .unwrap_or("Still working on it... ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_phrases_end_with_trailing_space() {
        for cat in CATEGORIES.iter().chain(std::iter::once(&FALLBACK)) {
            for p in cat.initial.iter().chain(cat.keep_alive.iter()) {
                assert!(p.ends_with(' '), "{:?} in {} lacks trailing space", p, cat.name);
            }
        }
    }

    #[test]
    fn match_category_is_case_insensitive_substring() {
        let cat = match_category("Can you check my INBOX for anything from Dana?");
        assert_eq!(cat.name, "email");
    }

    #[test]
    fn match_category_falls_back_when_no_keyword_hits() {
        let cat = match_category("tell me a joke about ducks");
        assert_eq!(cat.name, "fallback");
    }

    #[test]
    fn match_category_respects_table_order_priority() {
        // "meeting" only appears in calendar's keywords; sanity check that
        // the first hit wins rather than scanning for a "better" one.
        let cat = match_category("what's my next meeting");
        assert_eq!(cat.name, "calendar");
    }

    #[test]
    fn pick_initial_never_repeats_when_multiple_phrases_exist() {
        let cat = &CATEGORIES[0];
        assert!(cat.initial.len() >= 2);
        let mut prev = pick_initial(cat);
        for _ in 0..50 {
            let next = pick_initial(cat);
            assert_ne!(prev, next);
            prev = next;
        }
    }

    #[test]
    fn pick_initial_allows_repetition_for_single_phrase_category() {
        let single = PhraseCategory {
            name: "single",
            keywords: &[],
            initial: &["Only one... "],
            keep_alive: &["Still on it... "],
        };
        for _ in 0..5 {
            assert_eq!(pick_initial(&single), "Only one... ");
        }
    }

    #[test]
    fn pick_keep_alive_round_robins_deterministically() {
        let cat = &CATEGORIES[0];
        let len = cat.keep_alive.len();
        for i in 0..len * 2 {
            assert_eq!(pick_keep_alive(cat, i), cat.keep_alive[i % len]);
        }
    }
}
