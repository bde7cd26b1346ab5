//! In-memory collaborators for dispatcher and formatter tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::FixedOffset;

use crate::chat::{ChatFile, ChatMessage, SharedFile, UserIdentity};
use crate::collaborators::{
    ChatPlatform, CollaboratorError, DocumentHandle, DocumentStore, ImageRelay, JobRecords,
};
use crate::dispatcher::{DispatcherSettings, EventDispatcher};
use crate::job_number::JobNumber;
use crate::thread_registry::ThreadRegistry;

pub(crate) fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).expect("utc offset")
}

pub(crate) fn message(ts: &str, user: Option<&str>, text: &str) -> ChatMessage {
    ChatMessage {
        ts: ts.to_string(),
        user: user.map(str::to_string),
        text: Some(text.to_string()),
        ..Default::default()
    }
}

pub(crate) fn reply(ts: &str, thread_ts: &str, user: Option<&str>, text: &str) -> ChatMessage {
    ChatMessage {
        thread_ts: Some(thread_ts.to_string()),
        ..message(ts, user, text)
    }
}

pub(crate) fn image_file(id: &str) -> ChatFile {
    ChatFile {
        id: id.to_string(),
        name: Some(format!("{}.png", id)),
        mimetype: Some("image/png".to_string()),
        url_private: Some(format!("https://files.example/{}.png", id)),
        permalink: Some(format!("https://team.example/files/{}", id)),
    }
}

pub(crate) fn document_file(id: &str) -> ChatFile {
    ChatFile {
        id: id.to_string(),
        name: Some(format!("{}.pdf", id)),
        mimetype: Some("application/pdf".to_string()),
        url_private: Some(format!("https://files.example/{}.pdf", id)),
        permalink: Some(format!("https://team.example/files/{}", id)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("fake state lock")
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PostedReply {
    pub channel: String,
    pub thread_ts: String,
    pub text: String,
}

#[derive(Default)]
pub(crate) struct FakeChat {
    users: HashMap<String, UserIdentity>,
    threads: HashMap<String, Vec<ChatMessage>>,
    history: HashMap<String, Vec<ChatMessage>>,
    failing_history: HashSet<String>,
    files: HashMap<String, SharedFile>,
    replies: Mutex<Vec<PostedReply>>,
    user_lookups: Mutex<usize>,
    thread_fetches: Mutex<usize>,
    history_fetches: Mutex<Vec<String>>,
}

impl FakeChat {
    pub(crate) fn with_user(
        mut self,
        user_id: &str,
        display_name: Option<&str>,
        real_name: Option<&str>,
    ) -> Self {
        self.users.insert(
            user_id.to_string(),
            UserIdentity {
                display_name: display_name.map(str::to_string),
                real_name: real_name.map(str::to_string),
            },
        );
        self
    }

    pub(crate) fn with_thread(mut self, thread_ts: &str, messages: Vec<ChatMessage>) -> Self {
        self.threads.insert(thread_ts.to_string(), messages);
        self
    }

    pub(crate) fn with_history(mut self, channel: &str, messages: Vec<ChatMessage>) -> Self {
        self.history.insert(channel.to_string(), messages);
        self
    }

    pub(crate) fn with_failing_history(mut self, channel: &str) -> Self {
        self.failing_history.insert(channel.to_string());
        self
    }

    pub(crate) fn with_file(mut self, file: SharedFile) -> Self {
        self.files.insert(file.id.clone(), file);
        self
    }

    pub(crate) fn replies(&self) -> Vec<PostedReply> {
        lock(&self.replies).clone()
    }

    pub(crate) fn user_lookups(&self) -> usize {
        *lock(&self.user_lookups)
    }

    pub(crate) fn thread_fetches(&self) -> usize {
        *lock(&self.thread_fetches)
    }

    pub(crate) fn history_fetches(&self) -> Vec<String> {
        lock(&self.history_fetches).clone()
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn post_thread_reply(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<(), CollaboratorError> {
        lock(&self.replies).push(PostedReply {
            channel: channel.to_string(),
            thread_ts: thread_ts.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn fetch_thread(
        &self,
        _channel: &str,
        thread_ts: &str,
    ) -> Result<Vec<ChatMessage>, CollaboratorError> {
        *lock(&self.thread_fetches) += 1;
        tokio::task::yield_now().await;
        Ok(self.threads.get(thread_ts).cloned().unwrap_or_default())
    }

    async fn user_identity(&self, user_id: &str) -> Result<UserIdentity, CollaboratorError> {
        *lock(&self.user_lookups) += 1;
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::Api("user_not_found".to_string()))
    }

    async fn file_info(&self, file_id: &str) -> Result<SharedFile, CollaboratorError> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::Api("file_not_found".to_string()))
    }

    async fn channel_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CollaboratorError> {
        lock(&self.history_fetches).push(channel.to_string());
        if self.failing_history.contains(channel) {
            return Err(CollaboratorError::Api("channel_not_found".to_string()));
        }
        Ok(self
            .history
            .get(channel)
            .map(|messages| messages.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct FakeRecords {
    jobs: HashSet<String>,
    failing: bool,
    lookups: Mutex<usize>,
}

impl FakeRecords {
    pub(crate) fn with_jobs(jobs: &[&str]) -> Self {
        Self {
            jobs: jobs.iter().map(|job| job.to_string()).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub(crate) fn lookups(&self) -> usize {
        *lock(&self.lookups)
    }
}

#[async_trait]
impl JobRecords for FakeRecords {
    async fn contains_job(&self, job_number: &JobNumber) -> Result<bool, CollaboratorError> {
        *lock(&self.lookups) += 1;
        tokio::task::yield_now().await;
        if self.failing {
            return Err(CollaboratorError::Timeout("sheet read".to_string()));
        }
        Ok(self.jobs.contains(job_number.as_str()))
    }
}

#[derive(Default)]
pub(crate) struct FakeDocs {
    documents: HashMap<String, DocumentHandle>,
    failing_search: bool,
    failing_append: bool,
    appends: Mutex<Vec<(String, String)>>,
}

impl FakeDocs {
    pub(crate) fn with_document(mut self, job: &str, doc_id: &str) -> Self {
        self.documents
            .insert(job.to_string(), DocumentHandle::new(doc_id));
        self
    }

    pub(crate) fn with_failing_search(mut self) -> Self {
        self.failing_search = true;
        self
    }

    pub(crate) fn with_failing_append(mut self) -> Self {
        self.failing_append = true;
        self
    }

    pub(crate) fn appends(&self) -> Vec<(String, String)> {
        lock(&self.appends).clone()
    }
}

#[async_trait]
impl DocumentStore for FakeDocs {
    async fn find_document(
        &self,
        job_number: &JobNumber,
    ) -> Result<Option<DocumentHandle>, CollaboratorError> {
        tokio::task::yield_now().await;
        if self.failing_search {
            return Err(CollaboratorError::Status {
                status: 500,
                body: "backend error".to_string(),
            });
        }
        Ok(self.documents.get(job_number.as_str()).cloned())
    }

    async fn append_text(
        &self,
        document: &DocumentHandle,
        text: &str,
    ) -> Result<(), CollaboratorError> {
        if self.failing_append {
            return Err(CollaboratorError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        lock(&self.appends).push((document.id.clone(), text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeRelay {
    failing: bool,
    failures_left: Mutex<usize>,
    relays: Mutex<Vec<(String, String)>>,
}

impl FakeRelay {
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// Fails the first `count` relays, then succeeds.
    pub(crate) fn failing_first(count: usize) -> Self {
        Self {
            failures_left: Mutex::new(count),
            ..Default::default()
        }
    }

    pub(crate) fn relays(&self) -> Vec<(String, String)> {
        lock(&self.relays).clone()
    }
}

#[async_trait]
impl ImageRelay for FakeRelay {
    async fn relay_image(
        &self,
        document: &DocumentHandle,
        image_url: &str,
    ) -> Result<(), CollaboratorError> {
        lock(&self.relays).push((document.id.clone(), image_url.to_string()));
        let fail_now = {
            let mut left = lock(&self.failures_left);
            if *left > 0 {
                *left -= 1;
                true
            } else {
                false
            }
        };
        if self.failing || fail_now {
            return Err(CollaboratorError::Status {
                status: 500,
                body: "script error".to_string(),
            });
        }
        Ok(())
    }
}

/// A dispatcher wired to fakes, keeping handles to inspect them afterwards.
pub(crate) struct Harness {
    pub registry: Arc<ThreadRegistry>,
    pub chat: Arc<FakeChat>,
    pub records: Arc<FakeRecords>,
    pub docs: Arc<FakeDocs>,
    pub relay: Arc<FakeRelay>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl Harness {
    pub(crate) fn new(chat: FakeChat, records: FakeRecords, docs: FakeDocs, relay: FakeRelay) -> Self {
        Self::with_bot_identity(chat, records, docs, relay, Some("UBOT"), Some("BBOT"))
    }

    pub(crate) fn with_bot_identity(
        chat: FakeChat,
        records: FakeRecords,
        docs: FakeDocs,
        relay: FakeRelay,
        bot_user_id: Option<&str>,
        bot_id: Option<&str>,
    ) -> Self {
        let registry = Arc::new(ThreadRegistry::new());
        let chat = Arc::new(chat);
        let records = Arc::new(records);
        let docs = Arc::new(docs);
        let relay = Arc::new(relay);
        let settings = DispatcherSettings {
            bot_user_id: bot_user_id.map(str::to_string),
            bot_id: bot_id.map(str::to_string),
            history_limit: 50,
            utc_offset: utc(),
        };
        let dispatcher = Arc::new(EventDispatcher::new(
            registry.clone(),
            chat.clone(),
            records.clone(),
            docs.clone(),
            relay.clone(),
            settings,
        ));
        Self {
            registry,
            chat,
            records,
            docs,
            relay,
            dispatcher,
        }
    }
}
