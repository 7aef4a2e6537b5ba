//! Prompt assembly from artist and genre vocabulary.
//!
//! A genre contributes its subject/style/method; the artist contributes
//! the name the prompt is anchored on. Artists without genre records fall
//! back to a generic subject pool so generation never blocks on curation
//! lag.

use catalog::artists::{Artist, Genre};
use catalog::records::Orientation;
use rand::seq::SliceRandom;
use rand::Rng;

/// Fallback subjects for artists with no genre vocabulary yet.
const SUBJECT_POOL: &[&str] = &[
    "portrait",
    "landscape",
    "still life",
    "city scene",
    "seascape",
    "interior scene",
    "figure study",
    "pastoral scene",
];

const NEGATIVE_PROMPT: &str =
    "blurry, grainy, low quality, watermark, signature, text, frame, border, \
     deformed, disfigured, extra limbs";

/// Provenance recorded on the generated image, flattened into `query-*`
/// fields by the orchestrator.
#[derive(Debug, Clone)]
pub struct PromptQuery {
    pub artist_id: String,
    pub artist_name: String,
    pub subject: String,
    pub style: Option<String>,
    pub method: Option<String>,
}

/// A fully assembled generation prompt.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub text: String,
    pub negative: String,
    pub orientation: Orientation,
    pub query: PromptQuery,
}

/// Orientation for a subject: portraits and figure studies hang tall,
/// landscapes hang wide, anything else is a coin toss.
fn orientation_for_subject<R: Rng + ?Sized>(subject: &str, rng: &mut R) -> Orientation {
    let subject = subject.to_ascii_lowercase();
    if subject.contains("portrait") || subject.contains("figure") {
        Orientation::Portrait
    } else if subject.contains("landscape")
        || subject.contains("seascape")
        || subject.contains("city")
        || subject.contains("pastoral")
    {
        Orientation::Landscape
    } else {
        *[
            Orientation::Portrait,
            Orientation::Landscape,
            Orientation::Square,
        ]
        .choose(rng)
        .unwrap_or(&Orientation::Square)
    }
}

/// Assemble the prompt for one artist and an optional genre.
pub fn build_prompt<R: Rng + ?Sized>(
    artist: &Artist,
    genre: Option<&Genre>,
    rng: &mut R,
) -> Prompt {
    let subject = genre
        .and_then(|g| g.subject.clone())
        .unwrap_or_else(|| {
            SUBJECT_POOL
                .choose(rng)
                .copied()
                .unwrap_or("portrait")
                .to_string()
        });
    let style = genre.and_then(|g| g.style.clone());
    let method = genre.and_then(|g| g.method.clone());

    let mut text = subject.clone();
    if let Some(ref method) = method {
        text.push_str(&format!(", {method}"));
    }
    text.push_str(&format!(" by {}", artist.name));
    if let Some(ref style) = style {
        text.push_str(&format!(", {style}"));
    }
    text.push_str(", masterful composition, highly detailed");

    Prompt {
        text,
        negative: NEGATIVE_PROMPT.to_string(),
        orientation: orientation_for_subject(&subject, rng),
        query: PromptQuery {
            artist_id: artist.id.clone(),
            artist_name: artist.name.clone(),
            subject,
            style,
            method,
        },
    }
}
