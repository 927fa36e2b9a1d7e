use std::fmt::Write;

use crate::document::{DocumentClass, Segment};

/// Build the schema-constrained prompt for one segment.
///
/// Image segments carry their payload as an attachment, so the prompt only
/// refers to "the attached image".
pub fn extraction_prompt(class: DocumentClass, segment: &Segment, total_segments: usize) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are a document data extraction engine. Document type: {class}. {}",
        class.description()
    );

    if class.schema().is_empty() {
        prompt.push_str(
            "Extract every meaningful field as a flat JSON object of key/value pairs.\n",
        );
    } else {
        prompt.push_str("Return a JSON object with exactly these fields:\n");
        for spec in class.schema() {
            let _ = writeln!(
                prompt,
                "- {} ({}): {}",
                spec.name,
                spec.kind.json_type(),
                spec.description
            );
        }
        prompt.push_str("Use null for any field that does not appear in the content.\n");
    }
    prompt.push_str("Respond with JSON only, no commentary.\n\n");

    let _ = writeln!(
        prompt,
        "Part {} of {}.",
        segment.index() + 1,
        total_segments.max(1)
    );

    match segment {
        Segment::Text { text, .. } => {
            prompt.push_str("Content:\n");
            prompt.push_str(text);
            prompt.push('\n');
        }
        Segment::Image { .. } => prompt.push_str("Content: the attached image.\n"),
    }

    prompt
}
