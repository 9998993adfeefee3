use std::collections::HashMap;

const VISION_PROMPT: &str = r#"You are an expert educational analyst.
A student photographed something to study (a textbook page, a diagram, a homework problem)
and asked: "{question}"

Look at the image carefully and reply with a single JSON object and nothing else:
{
  "subject": "<main academic subject, e.g. Biology, Physics, Mathematics>",
  "topic": "<the specific topic shown, e.g. photosynthesis, quadratic equations>",
  "context": "<two or three sentences describing what the image shows>",
  "question": "<the student's question, restated clearly>"
}"#;

const SCRIPT_PROMPT: &str = r#"You are an expert educator writing a short narrated explainer for a student.

Subject: {subject}
Topic: {topic}
What the image shows: {context}
Student's question: {question}

Split the explainer into 3 to 5 sections. Every section needs:
- narration: 2 to 4 spoken sentences explaining one key idea, clear and enthusiastic
- image_prompt: a detailed prompt for an image model describing an educational diagram for that idea

Reply with a single JSON object and nothing else:
{
  "title": "<catchy title>",
  "intro": "<one welcoming sentence the narrator says first>",
  "sections": [
    {
      "id": 1,
      "narration": "<spoken text>",
      "image_prompt": "<educational diagram, clean white background, labeled, colorful>"
    }
  ],
  "outro": "<one closing sentence>"
}"#;

const NARRATOR_INSTRUCTIONS: &str = "You are an enthusiastic, friendly tutor. Read the text you are \
given naturally and expressively, as if explaining it to a curious student. Speak only the text \
provided and add no commentary of your own.";

/// Prompt templates used by the pipeline. Placeholders are written as `{name}`.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub vision: String,
    pub script: String,
    pub narrator: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            vision: VISION_PROMPT.to_string(),
            script: SCRIPT_PROMPT.to_string(),
            narrator: NARRATOR_INSTRUCTIONS.to_string(),
        }
    }
}

impl Prompts {
    /// Replaces the defaults with any entries keyed `vision`, `script` or `narrator`.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (key, slot) in [
            ("vision", &mut self.vision),
            ("script", &mut self.script),
            ("narrator", &mut self.narrator),
        ] {
            if let Some(text) = overrides.get(key) {
                tracing::info!("Using prompt override for '{}'", key);
                *slot = text.trim().to_string();
            }
        }
        self
    }
}

/// Substitutes `{name}` placeholders in one left-to-right pass, so substituted values are never
/// expanded again. Unknown placeholders and literal JSON braces are left as is.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
