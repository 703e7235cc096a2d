//! Scripted in-memory implementations of the adapter traits. Deterministic,
//! no network. Each mock records its calls so tests can assert on what the
//! pipeline actually asked for.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use image_client::{ImageGenerator, ImageHost};
use llm_client::{CompletionRequest, LanguageModel};
use newsdesk_common::AdapterError;
use telegram_client::{MessagePayload, Messenger};

use crate::sources::{Headline, NewsSource, TextExtractor};

/// Replays a scripted sequence of completion replies in order.
#[derive(Default)]
pub struct MockLlm {
    script: Mutex<VecDeque<Result<String, AdapterError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: AdapterError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AdapterError> {
        self.calls.lock().unwrap().push(request.prompt.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted completion call: {}", request.prompt))
    }
}

/// Succeeds with dummy bytes unless the next scripted outcome says
/// otherwise.
#[derive(Default)]
pub struct MockImageGen {
    script: Mutex<VecDeque<Result<(), AdapterError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockImageGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self) -> Self {
        self.script.lock().unwrap().push_back(Ok(()));
        self
    }

    pub fn then_fail(self, error: AdapterError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// (prompt, model) pairs seen so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for MockImageGen {
    async fn generate(
        &self,
        prompt: &str,
        _width: u32,
        _height: u32,
        model: &str,
    ) -> Result<Vec<u8>, AdapterError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), model.to_string()));
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(())) | None => Ok(vec![0u8; 2048]),
            Some(Err(e)) => Err(e),
        }
    }
}

#[derive(Default)]
pub struct MockImageHost {
    uploads: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Result<(), AdapterError>>>,
}

impl MockImageHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_fail(self, error: AdapterError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageHost for MockImageHost {
    async fn upload(&self, _bytes: Vec<u8>, filename: &str) -> Result<String, AdapterError> {
        if let Some(Err(e)) = self.script.lock().unwrap().pop_front() {
            return Err(e);
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(filename.to_string());
        Ok(format!("https://img.test/{}", uploads.len()))
    }
}

#[derive(Default)]
pub struct MockMessenger {
    sent: Mutex<Vec<(i64, String)>>,
    failing_chats: Mutex<Vec<i64>>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send to this chat fails permanently.
    pub fn failing_chat(self, chat_id: i64) -> Self {
        self.failing_chats.lock().unwrap().push(chat_id);
        self
    }

    /// (chat_id, rendered message) per delivered send.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send(&self, chat_id: i64, payload: &MessagePayload) -> Result<(), AdapterError> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(AdapterError::Permanent("chat blocked the bot".to_string()));
        }
        self.sent.lock().unwrap().push((chat_id, payload.render()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockNewsSource {
    headlines: Mutex<Vec<Headline>>,
}

impl MockNewsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headline(self, title: &str, url: &str, source_name: &str) -> Self {
        self.headlines.lock().unwrap().push(Headline {
            title: title.to_string(),
            description: format!("{title} in brief"),
            url: url.to_string(),
            source_name: source_name.to_string(),
        });
        self
    }
}

#[async_trait]
impl NewsSource for MockNewsSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn top_headlines(
        &self,
        _category: &str,
        _count: usize,
    ) -> Result<Vec<Headline>, AdapterError> {
        Ok(self.headlines.lock().unwrap().clone())
    }
}

/// Returns a canned body per url; unknown urls get a generic long body.
#[derive(Default)]
pub struct MockExtractor {
    bodies: Mutex<HashMap<String, Option<String>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(self, url: &str, body: Option<&str>) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.map(String::from));
        self
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract_full_text(&self, url: &str) -> Result<Option<String>, AdapterError> {
        if let Some(body) = self.bodies.lock().unwrap().get(url) {
            return Ok(body.clone());
        }
        Ok(Some(
            "A generic article body long enough to clear the extraction floor, \
             repeated for good measure. A generic article body long enough."
                .to_string(),
        ))
    }
}
