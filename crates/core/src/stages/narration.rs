use crate::channel::EventSink;
use crate::error::NarrationError;
use crate::events::OutboundEvent;
use crate::generic_types::{SpeechSessionConfig, SpeechUnit};
use crate::model::{INTRO_SECTION_ID, OUTRO_SECTION_ID, Script};
use crate::realtime_api::{SpeechConnector, SpeechSession};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Narrates a script over one persistent speech session, strictly in document order.
pub struct NarrationStage {
    speech: Arc<dyn SpeechConnector>,
    config: SpeechSessionConfig,
}

impl NarrationStage {
    pub fn new(speech: Arc<dyn SpeechConnector>, config: SpeechSessionConfig) -> Self {
        Self { speech, config }
    }

    /// Opens the session, narrates intro, sections and outro, then closes the session on every
    /// exit path. A failure is reported as a single `error` event and never escapes the stage.
    pub async fn narrate_all(&self, script: &Script, sink: &EventSink, cancel: &CancellationToken) {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            opened = self.speech.open(&self.config) => opened,
        };
        let mut session = match opened {
            Ok(session) => session,
            Err(e) => return report(sink, NarrationError::Open(e)),
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NarrationError::Cancelled),
            outcome = narrate_script(session.as_mut(), script, sink) => outcome,
        };

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close speech session cleanly: {:#}", e);
        }

        match outcome {
            Ok(()) => tracing::info!("Narration complete ({} sections)", script.sections.len()),
            Err(NarrationError::Cancelled) => tracing::debug!("Narration cancelled"),
            Err(e) => report(sink, e),
        }
    }
}

fn report(sink: &EventSink, error: NarrationError) {
    tracing::error!("Narration error: {}", error);
    sink.emit(OutboundEvent::error(format!("Narration error: {error}")));
}

async fn narrate_script(
    session: &mut dyn SpeechSession,
    script: &Script,
    sink: &EventSink,
) -> Result<(), NarrationError> {
    if !script.intro.trim().is_empty() {
        narrate_turn(session, &script.intro, INTRO_SECTION_ID, sink).await?;
    }

    for section in &script.sections {
        sink.emit(OutboundEvent::SectionStart {
            section_id: section.id,
        });
        if section.narration_text.trim().is_empty() {
            tracing::warn!("Section {} has no narration text", section.id);
        } else {
            narrate_turn(session, &section.narration_text, section.id, sink).await?;
        }
        sink.emit(OutboundEvent::SectionEnd {
            section_id: section.id,
        });
    }

    if !script.outro.trim().is_empty() {
        narrate_turn(session, &script.outro, OUTRO_SECTION_ID, sink).await?;
    }
    Ok(())
}

/// Submits one text turn and forwards every unit until the turn completes.
async fn narrate_turn(
    session: &mut dyn SpeechSession,
    text: &str,
    section_id: i32,
    sink: &EventSink,
) -> Result<(), NarrationError> {
    session.send_turn(text).await.map_err(NarrationError::Stream)?;

    loop {
        match session.next_unit().await.map_err(NarrationError::Stream)? {
            Some(SpeechUnit::Audio(chunk)) => {
                if !chunk.is_empty() {
                    sink.emit(OutboundEvent::Audio { section_id, chunk });
                }
            }
            Some(SpeechUnit::Text(content)) => {
                if !content.is_empty() {
                    sink.emit(OutboundEvent::Text {
                        section_id,
                        content,
                    });
                }
            }
            Some(SpeechUnit::TurnComplete) => return Ok(()),
            None => return Err(NarrationError::EndedEarly(section_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::OutputChannel;
    use crate::model::Section;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers every turn with one audio chunk and one transcript fragment echoing the text.
    #[derive(Default)]
    struct EchoSpeech {
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    struct EchoSession {
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
        pending: VecDeque<SpeechUnit>,
    }

    #[async_trait]
    impl SpeechConnector for EchoSpeech {
        async fn open(&self, _config: &SpeechSessionConfig) -> Result<Box<dyn SpeechSession>> {
            self.log.lock().unwrap().push("open".to_string());
            Ok(Box::new(EchoSession {
                log: self.log.clone(),
                fail_on: self.fail_on.clone(),
                pending: VecDeque::new(),
            }))
        }
    }

    #[async_trait]
    impl SpeechSession for EchoSession {
        async fn send_turn(&mut self, text: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("turn:{text}"));
            if self.fail_on.as_deref() == Some(text) {
                self.pending.clear();
                return Ok(());
            }
            self.pending.push_back(SpeechUnit::Audio(text.as_bytes().to_vec()));
            self.pending.push_back(SpeechUnit::Text(text.to_string()));
            self.pending.push_back(SpeechUnit::TurnComplete);
            Ok(())
        }

        async fn next_unit(&mut self) -> Result<Option<SpeechUnit>> {
            match self.pending.pop_front() {
                Some(unit) => Ok(Some(unit)),
                None => Err(anyhow::anyhow!("socket reset")),
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.log.lock().unwrap().push("close".to_string());
            Ok(())
        }
    }

    fn script() -> Script {
        Script {
            title: "T".to_string(),
            intro: "hello".to_string(),
            sections: vec![
                Section {
                    id: 1,
                    narration_text: "first".to_string(),
                    media_prompt: String::new(),
                },
                Section {
                    id: 2,
                    narration_text: "second".to_string(),
                    media_prompt: String::new(),
                },
            ],
            outro: "bye".to_string(),
        }
    }

    async fn collect(mut rx: crate::channel::OutputReceiver) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn narrates_in_document_order_over_one_session() {
        let speech = EchoSpeech::default();
        let log = speech.log.clone();
        let stage = NarrationStage::new(Arc::new(speech), SpeechSessionConfig::default());

        let (mut output, rx) = OutputChannel::new();
        stage
            .narrate_all(&script(), &output.session_sink(), &CancellationToken::new())
            .await;
        output.close();

        let skeleton: Vec<(String, i32)> = collect(rx)
            .await
            .into_iter()
            .map(|e| match &e {
                OutboundEvent::SectionStart { section_id }
                | OutboundEvent::SectionEnd { section_id }
                | OutboundEvent::Audio { section_id, .. }
                | OutboundEvent::Text { section_id, .. } => (e.kind().to_string(), *section_id),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        let expected: Vec<(String, i32)> = [
            ("audio", 0),
            ("text", 0),
            ("section_start", 1),
            ("audio", 1),
            ("text", 1),
            ("section_end", 1),
            ("section_start", 2),
            ("audio", 2),
            ("text", 2),
            ("section_end", 2),
            ("audio", -1),
            ("text", -1),
        ]
        .iter()
        .map(|(k, id)| (k.to_string(), *id))
        .collect();
        assert_eq!(skeleton, expected);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["open", "turn:hello", "turn:first", "turn:second", "turn:bye", "close"]
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_reports_one_error_and_closes() {
        let speech = EchoSpeech {
            fail_on: Some("second".to_string()),
            ..Default::default()
        };
        let log = speech.log.clone();
        let stage = NarrationStage::new(Arc::new(speech), SpeechSessionConfig::default());

        let (mut output, rx) = OutputChannel::new();
        stage
            .narrate_all(&script(), &output.session_sink(), &CancellationToken::new())
            .await;
        output.close();

        let events = collect(rx).await;
        let errors: Vec<&OutboundEvent> = events
            .iter()
            .filter(|e| matches!(e, OutboundEvent::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(events.last(), Some(OutboundEvent::Error { message }) if message.starts_with("Narration error")));
        assert!(!events.iter().any(|e| matches!(e, OutboundEvent::SectionEnd { section_id: 2 })));
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("close"));
    }

    #[tokio::test]
    async fn open_failure_reports_error() {
        struct Unreachable;
        #[async_trait]
        impl SpeechConnector for Unreachable {
            async fn open(&self, _config: &SpeechSessionConfig) -> Result<Box<dyn SpeechSession>> {
                Err(anyhow::anyhow!("dns failure"))
            }
        }

        let stage = NarrationStage::new(Arc::new(Unreachable), SpeechSessionConfig::default());
        let (mut output, rx) = OutputChannel::new();
        stage
            .narrate_all(&script(), &output.session_sink(), &CancellationToken::new())
            .await;
        output.close();

        let events = collect(rx).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "error");
    }
}
