use crate::channel::EventSink;
use crate::error::PipelineError;
use crate::events::OutboundEvent;
use crate::model::{ContextRecord, Script, ScriptWire};
use crate::parse::parse_or_degrade;
use crate::prompts::render;
use crate::services::TextGenerator;
use std::sync::Arc;

/// Turns a `ContextRecord` into a multi-section `Script`.
pub struct ScriptingStage {
    text: Arc<dyn TextGenerator>,
    prompt: String,
}

impl ScriptingStage {
    pub fn new(text: Arc<dyn TextGenerator>, prompt: impl Into<String>) -> Self {
        Self {
            text,
            prompt: prompt.into(),
        }
    }

    /// Generates the script and emits `title`. Unusable output degrades to `Script::fallback`.
    pub async fn script(
        &self,
        context: &ContextRecord,
        sink: &EventSink,
    ) -> Result<Script, PipelineError> {
        let prompt = render(
            &self.prompt,
            &[
                ("subject", &context.subject),
                ("topic", &context.topic),
                ("context", &context.description),
                ("question", &context.restated_question),
            ],
        );
        let raw = self
            .text
            .generate(&prompt)
            .await
            .map_err(|e| PipelineError::upstream("scripting", e))?;

        let script = parse_or_degrade(
            &raw,
            "Scripting",
            |wire: ScriptWire| wire.into_script(context),
            |_| Script::fallback(context),
        );
        tracing::info!(
            title = %script.title,
            sections = script.sections.len(),
            "Script generated"
        );

        sink.emit(OutboundEvent::Title {
            text: script.title.clone(),
        });
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::OutputChannel;
    use crate::services::MockTextGenerator;

    fn context() -> ContextRecord {
        ContextRecord {
            subject: "Chemistry".to_string(),
            topic: "Covalent bonds".to_string(),
            description: "Two atoms sharing electrons.".to_string(),
            restated_question: "What holds molecules together?".to_string(),
        }
    }

    #[tokio::test]
    async fn generated_script_is_parsed_and_titled() {
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .withf(|prompt| prompt.contains("Covalent bonds") && prompt.contains("sharing electrons"))
            .returning(|_| {
                Ok(r#"{"title":"Sharing is Bonding","intro":"Hi!","sections":[
                    {"id":1,"narration":"Atoms share.","image_prompt":"two atoms"},
                    {"id":2,"narration":"Electrons pair.","image_prompt":"electron pair"}
                ],"outro":"Bye!"}"#
                    .to_string())
            })
            .once();

        let (mut output, mut rx) = OutputChannel::new();
        let stage = ScriptingStage::new(Arc::new(text), "{subject} {topic} {context} {question}");
        let script = stage.script(&context(), &output.session_sink()).await.unwrap();
        output.close();

        assert_eq!(script.title, "Sharing is Bonding");
        assert_eq!(script.sections.len(), 2);
        assert_eq!(script.sections[1].media_prompt, "electron pair");
        assert_eq!(
            rx.recv().await,
            Some(OutboundEvent::Title {
                text: "Sharing is Bonding".to_string()
            })
        );
    }

    #[tokio::test]
    async fn garbage_output_yields_single_section_fallback() {
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .returning(|_| Ok("¯\\_(ツ)_/¯ no json today".to_string()));

        let (output, _rx) = OutputChannel::new();
        let stage = ScriptingStage::new(Arc::new(text), "{topic}");
        let script = stage.script(&context(), &output.session_sink()).await.unwrap();

        assert_eq!(script, Script::fallback(&context()));
        assert_eq!(script.sections[0].narration_text, "Two atoms sharing electrons.");
    }

    #[tokio::test]
    async fn empty_section_list_yields_fallback() {
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .returning(|_| Ok(r#"{"title":"Nothing","sections":[]}"#.to_string()));

        let (output, _rx) = OutputChannel::new();
        let stage = ScriptingStage::new(Arc::new(text), "{topic}");
        let script = stage.script(&context(), &output.session_sink()).await.unwrap();
        assert_eq!(script.sections.len(), 1);
        assert_eq!(script.title, "Covalent bonds");
    }

    #[tokio::test]
    async fn partially_null_script_is_not_discarded() {
        let mut text = MockTextGenerator::new();
        text.expect_generate().returning(|_| {
            Ok(r#"{"title":"Bonds","intro":null,"sections":[
                {"id":"1","narration":"Atoms share.","image_prompt":null},
                {"id":"2","narration":"Electrons pair.","image_prompt":"electron pair"}
            ]}"#
            .to_string())
        });

        let (output, _rx) = OutputChannel::new();
        let stage = ScriptingStage::new(Arc::new(text), "{topic}");
        let script = stage.script(&context(), &output.session_sink()).await.unwrap();
        assert_eq!(script.title, "Bonds");
        assert_eq!(script.sections.len(), 2);
        assert_eq!(script.sections[0].media_prompt, "Educational diagram about Covalent bonds");
        assert_eq!(script.intro, "");
    }
}
