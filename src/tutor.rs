use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::AppConfig;
use crate::models::{SummarizeRequest, TutorReply, TutorRequest};
use crate::normalize::{normalize_reply, normalize_summary};
use crate::openai::{ChatCompletionRequest, OpenAiClient, ResponseFormat, UpstreamResponse};
use crate::prompt::{
    build_summary_messages, build_transcript_messages, build_turn_prompt, PromptFlags,
};

/// Outcome of one tutoring turn: a normalized reply, or the upstream failure
/// carried through for the caller to surface unchanged.
pub enum TurnOutcome {
    Reply(TutorReply),
    UpstreamError { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct TutorService {
    config: AppConfig,
    openai: OpenAiClient,
    flags: PromptFlags,
}

impl TutorService {
    pub fn new(config: AppConfig, openai: OpenAiClient) -> Self {
        Self {
            config,
            openai,
            flags: PromptFlags::default(),
        }
    }

    /// One conversational turn: build the prompt, call the provider, and
    /// normalize whatever came back. The optional session summary is a
    /// second, strictly sequential call.
    pub async fn respond(&self, request: TutorRequest) -> Result<TurnOutcome> {
        let plan = request.question_plan();
        let prompt = build_turn_prompt(
            self.flags,
            &request.history,
            &request.user,
            request.book.as_ref(),
            plan.as_ref(),
            request.end_session,
        );

        let payload = ChatCompletionRequest {
            model: self.config.models.chat_model.clone(),
            temperature: Some(0.7),
            max_tokens: self.config.tokens.chat_max_tokens,
            messages: prompt.messages,
            response_format: self.flags.strict_json.then(ResponseFormat::json_object),
        };

        let response = self.openai.chat(&payload).await?;
        if !response.status.is_success() {
            tracing::warn!("chat completion failed upstream: {}", response.status);
            return Ok(TurnOutcome::UpstreamError {
                status: response.status,
                body: response.body,
            });
        }

        let mut reply = normalize_reply(&response.body);

        if reply.session_summary.is_none()
            && (request.end_session || self.config.always_summarize)
        {
            reply.session_summary = self.session_summary(&request).await;
        }

        Ok(TurnOutcome::Reply(reply))
    }

    /// Best-effort summary of the learner's recent turns. A failed call is
    /// dropped and the reply ships without a summary; unparsable summary text
    /// degrades to a note object instead.
    async fn session_summary(&self, request: &TutorRequest) -> Option<Value> {
        let payload = ChatCompletionRequest {
            model: self.config.models.chat_model.clone(),
            temperature: Some(0.2),
            max_tokens: self.config.tokens.summary_max_tokens,
            messages: build_summary_messages(&request.history, self.config.summary_turns),
            response_format: None,
        };

        match self.openai.chat(&payload).await {
            Ok(response) if response.status.is_success() => {
                Some(normalize_summary(&response.body))
            }
            Ok(response) => {
                tracing::warn!("session summary call failed upstream: {}", response.status);
                None
            }
            Err(err) => {
                tracing::warn!("session summary call failed: {err}");
                None
            }
        }
    }

    /// Standalone transcript summarizer. The provider's status and body are
    /// returned verbatim so the caller can relay them unchanged.
    pub async fn summarize_transcript(
        &self,
        request: SummarizeRequest,
    ) -> Result<UpstreamResponse> {
        let payload = ChatCompletionRequest {
            model: self.config.models.chat_model.clone(),
            temperature: None,
            max_tokens: self.config.tokens.transcript_max_tokens,
            messages: build_transcript_messages(
                &request.transcript,
                request.max_words,
                &request.lang,
            ),
            response_format: None,
        };

        self.openai.chat(&payload).await
    }
}
