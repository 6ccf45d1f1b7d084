//! Task prompts for the built-in schemas.
//!
//! Centralising every prompt here keeps a single source of truth — tightening
//! an instruction or changing the requested JSON shape happens in exactly one
//! place — and lets unit tests inspect prompt text without a live model.
//!
//! Callers can override the system prompt via
//! [`crate::config::AnalysisConfig::system_prompt`]; the constants here are
//! used when no override is provided.

/// System prompt for the security-assessment schema.
pub const SECURITY_SYSTEM_PROMPT: &str = "\
You are a security-focused image analysis system. Your task is to carefully analyze images \
for potential security threats, weapons, suspicious activities, and provide detailed scene \
information.";

/// User prompt for the security-assessment schema.
///
/// Spells out the exact JSON shape for models without structured-output
/// support; models that honour the `format` field simply get it twice.
pub const SECURITY_USER_PROMPT: &str = r#"Analyze this image from a security perspective: look for weapons, people (even partial human presence counts), potential threats, and important objects in the scene.

Respond ONLY with a JSON object in the following format:
{
  "image_context": "brief description of the scene",
  "has_weapon": true/false,
  "has_people": true/false,
  "confidence": number between 0-100,
  "scene_type": "Indoor" | "Outdoor" | "Vehicle" | "Other",
  "potential_threats": ["list of potential threats"],
  "detected_objects": ["list of notable objects"]
}"#;

/// System prompt for general image description tasks (album covers etc.).
pub const DESCRIPTION_SYSTEM_PROMPT: &str = "\
You are a precise image description system. Your task is to carefully describe the image, \
including any objects, the scene, colors and any text you can detect.";

/// User prompt for the album-details schema.
pub const ALBUM_USER_PROMPT: &str = "\
Analyze this image of an album cover or liner notes. Transcribe the album title, artist, \
release year, genres and track list you can read, and respond ONLY with a JSON object \
matching the requested schema.";

/// Build the user prompt for named-entity extraction over a text passage.
pub fn entity_extraction_prompt(text: &str) -> String {
    format!(
        "Extract every organization, product, person and location mentioned in the text below. \
Respond ONLY with a JSON object with the keys \"organizations\", \"products\", \"people\" \
and \"locations\", each a list of strings.\n\n{text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_prompt_names_every_field() {
        for field in [
            "image_context",
            "has_weapon",
            "has_people",
            "confidence",
            "scene_type",
            "potential_threats",
            "detected_objects",
        ] {
            assert!(
                SECURITY_USER_PROMPT.contains(field),
                "prompt missing {field}"
            );
        }
    }

    #[test]
    fn entity_prompt_embeds_text() {
        let p = entity_extraction_prompt("The TPS Report was filed by Initech.");
        assert!(p.contains("The TPS Report was filed by Initech."));
        assert!(p.contains("organizations"));
        assert!(p.contains("locations"));
    }
}
