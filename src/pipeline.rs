/// Interaction pipeline boundary
///
/// What the application does after a trigger: capture a follow-up command,
/// strip the wake word from it, get a reply and speak it, with optional
/// motion cues for a servo head. The collaborators are external services;
/// only their interfaces live here.

use thiserror::Error;
use tracing::{info, warn};

/// Spoken when the response collaborator fails
pub const APOLOGY: &str = "Sorry, there was an error processing your request.";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Response generation failed: {0}")]
    Response(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(String),
}

/// Motion patterns a servo head can play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCue {
    Greeting,
    Listening,
    Thinking,
    Confused,
}

/// Speech-to-text for the follow-up utterance
#[cfg_attr(test, mockall::automock)]
pub trait Transcriber {
    /// Capture and transcribe one utterance; `None` if nothing was heard
    fn transcribe_command(&mut self) -> Result<Option<String>, PipelineError>;
}

/// Reply generation for a command
#[cfg_attr(test, mockall::automock)]
pub trait Responder {
    fn respond(&mut self, command: &str) -> Result<String, PipelineError>;
}

/// Text-to-speech
#[cfg_attr(test, mockall::automock)]
pub trait Speaker {
    fn speak(&mut self, text: &str) -> Result<(), PipelineError>;
}

/// Fire-and-forget motion controller
#[cfg_attr(test, mockall::automock)]
pub trait MotionCues {
    fn cue(&mut self, cue: MotionCue);
}

/// How one triggered turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A command was answered (possibly with the apology)
    Answered { command: String, reply: String },

    /// Only the wake word was said
    NoCommand,

    /// Nothing was heard before the transcriber gave up
    NothingHeard,

    /// A collaborator failed
    Failed(String),
}

/// Remove every occurrence of the wake word and tidy whitespace
pub fn strip_wake_word(transcript: &str, wake_word: &str) -> String {
    let lowered = transcript.to_lowercase();
    let wake_word = wake_word.trim().to_lowercase();

    let stripped = if wake_word.is_empty() {
        lowered
    } else {
        lowered.replace(&wake_word, " ")
    };

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Runs one turn per trigger against the external collaborators
pub struct Assistant<T, R, S> {
    transcriber: T,
    responder: R,
    speaker: S,
    motion: Option<Box<dyn MotionCues>>,
}

impl<T: Transcriber, R: Responder, S: Speaker> Assistant<T, R, S> {
    pub fn new(transcriber: T, responder: R, speaker: S) -> Self {
        Self {
            transcriber,
            responder,
            speaker,
            motion: None,
        }
    }

    pub fn with_motion(mut self, motion: Box<dyn MotionCues>) -> Self {
        self.motion = Some(motion);
        self
    }

    fn cue(&mut self, cue: MotionCue) {
        if let Some(motion) = self.motion.as_mut() {
            motion.cue(cue);
        }
    }

    /// Handle a positive detection for `wake_word`
    pub fn handle_trigger(&mut self, wake_word: &str) -> TurnOutcome {
        info!("Wake word '{}' detected, listening for command", wake_word);
        self.cue(MotionCue::Listening);

        let transcript = match self.transcriber.transcribe_command() {
            Ok(Some(text)) => text,
            Ok(None) => {
                info!("No command heard");
                return TurnOutcome::NothingHeard;
            }
            Err(e) => {
                warn!("{}", e);
                self.cue(MotionCue::Confused);
                return TurnOutcome::Failed(e.to_string());
            }
        };

        let command = strip_wake_word(&transcript, wake_word);
        if command.is_empty() {
            info!("No command after filtering wake word");
            return TurnOutcome::NoCommand;
        }
        info!("Command: {}", command);

        self.cue(MotionCue::Thinking);
        let reply = match self.responder.respond(&command) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{}", e);
                APOLOGY.to_string()
            }
        };

        if let Err(e) = self.speaker.speak(&reply) {
            warn!("{}", e);
            return TurnOutcome::Failed(e.to_string());
        }
        self.cue(MotionCue::Greeting);

        TurnOutcome::Answered { command, reply }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use test_case::test_case;

    #[test_case("Bumblebee what are the library hours", "bumblebee", "what are the library hours")]
    #[test_case("what courses BUMBLEBEE do you offer", "bumblebee", "what courses do you offer")]
    #[test_case("bumblebee", "bumblebee", "")]
    #[test_case("  hey  there ", "", "hey there")]
    #[test_case("hey siri where is the office", "hey siri", "where is the office")]
    fn test_strip_wake_word(transcript: &str, wake_word: &str, expected: &str) {
        assert_eq!(strip_wake_word(transcript, wake_word), expected);
    }

    #[test]
    fn test_full_turn() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe_command()
            .times(1)
            .returning(|| Ok(Some("Bumblebee where is the library".to_string())));

        let mut responder = MockResponder::new();
        responder
            .expect_respond()
            .with(eq("where is the library"))
            .times(1)
            .returning(|_| Ok("Second floor, east wing.".to_string()));

        let mut speaker = MockSpeaker::new();
        speaker
            .expect_speak()
            .with(eq("Second floor, east wing."))
            .times(1)
            .returning(|_| Ok(()));

        let mut seq = Sequence::new();
        let mut motion = MockMotionCues::new();
        for cue in [MotionCue::Listening, MotionCue::Thinking, MotionCue::Greeting] {
            motion
                .expect_cue()
                .with(eq(cue))
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }

        let mut assistant = Assistant::new(transcriber, responder, speaker).with_motion(Box::new(motion));
        assert_eq!(
            assistant.handle_trigger("bumblebee"),
            TurnOutcome::Answered {
                command: "where is the library".to_string(),
                reply: "Second floor, east wing.".to_string(),
            }
        );
    }

    #[test]
    fn test_wake_word_only_skips_responder() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe_command()
            .returning(|| Ok(Some("Bumblebee".to_string())));

        let mut responder = MockResponder::new();
        responder.expect_respond().never();
        let mut speaker = MockSpeaker::new();
        speaker.expect_speak().never();

        let mut assistant = Assistant::new(transcriber, responder, speaker);
        assert_eq!(assistant.handle_trigger("bumblebee"), TurnOutcome::NoCommand);
    }

    #[test]
    fn test_nothing_heard() {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe_command().returning(|| Ok(None));

        let mut assistant = Assistant::new(transcriber, MockResponder::new(), MockSpeaker::new());
        assert_eq!(assistant.handle_trigger("bumblebee"), TurnOutcome::NothingHeard);
    }

    #[test]
    fn test_transcription_failure_cues_confused() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe_command()
            .returning(|| Err(PipelineError::Transcription("could not understand".to_string())));

        let mut motion = MockMotionCues::new();
        motion.expect_cue().with(eq(MotionCue::Listening)).return_const(());
        motion.expect_cue().with(eq(MotionCue::Confused)).times(1).return_const(());

        let mut assistant =
            Assistant::new(transcriber, MockResponder::new(), MockSpeaker::new()).with_motion(Box::new(motion));
        assert!(matches!(assistant.handle_trigger("bumblebee"), TurnOutcome::Failed(_)));
    }

    #[test]
    fn test_responder_failure_speaks_apology() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe_command()
            .returning(|| Ok(Some("bumblebee what time is it".to_string())));

        let mut responder = MockResponder::new();
        responder
            .expect_respond()
            .returning(|_| Err(PipelineError::Response("HTTP 503".to_string())));

        let mut speaker = MockSpeaker::new();
        speaker.expect_speak().with(eq(APOLOGY)).times(1).returning(|_| Ok(()));

        let mut assistant = Assistant::new(transcriber, responder, speaker);
        assert_eq!(
            assistant.handle_trigger("bumblebee"),
            TurnOutcome::Answered {
                command: "what time is it".to_string(),
                reply: APOLOGY.to_string(),
            }
        );
    }
}
