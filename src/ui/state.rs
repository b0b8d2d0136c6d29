//! Application state container
//!
//! All state the window shows lives here and is only mutated on the UI
//! thread. Network work runs on a tokio runtime and reports back over a
//! crossbeam channel that [`AppState::poll_events`] drains once per frame.

use crate::api::{ApiClient, SearchResults, StartedChat, UploadedDocument};
use crate::audio::AudioPlayer;
use crate::config::ClientConfig;
use crate::messages::history::{filter_by_title, group_by_mode};
use crate::messages::{ChatMode, ChatSummary, Conversation, Message, Role};
use crate::session::SessionContext;
use crate::speech::{
    RecognitionEngine, RecognitionEvent, SpeakOptions, SpeechRecognizer, SpeechSynthesizer,
};
use crate::transport::{AudioSource, ChatStreamer, StreamEvent, VoiceEvent, VoiceSession};
use crate::upload::{FileSelector, SelectedFile, UploadLimits};
use crate::{Result, VoxError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_NOTIFICATIONS: usize = 5;

/// Results of background requests
#[derive(Debug)]
pub enum ClientEvent {
    ChatStarted {
        request_id: Uuid,
        mode: ChatMode,
        result: Result<StartedChat>,
    },
    ChatsLoaded(Result<Vec<ChatSummary>>),
    ChatLoaded {
        request_id: Uuid,
        chat_id: String,
        result: Result<Vec<Message>>,
    },
    ChatDeleted {
        chat_id: String,
        result: Result<()>,
    },
    DocumentUploaded {
        file_name: String,
        result: Result<UploadedDocument>,
    },
    SearchCompleted {
        query: String,
        result: Result<SearchResults>,
    },
}

/// A dismissible toast
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub is_error: bool,
}

/// The reply being streamed into the current conversation
#[derive(Debug, Clone)]
struct ActiveStream {
    request_id: Uuid,
    tentative_id: String,
    mode: ChatMode,
}

/// Network side of the state. Field order matters: the streamer aborts its
/// tasks before the runtime shuts down.
struct Backend {
    api: Arc<ApiClient>,
    streamer: ChatStreamer,
    stream_rx: Receiver<StreamEvent>,
    runtime: Runtime,
}

pub type BoxedRecognitionEngine = Box<dyn RecognitionEngine>;

pub struct AppState {
    pub config: ClientConfig,
    pub session: SessionContext,
    pub conversation: Conversation,

    /// Text in the input bar
    pub input_text: String,

    /// Streamed reply text not yet finalized
    pub streaming_text: String,

    /// Waiting for the service (typing indicator)
    pub is_typing: bool,

    pub chats: Vec<ChatSummary>,
    /// Filter applied to the chat history
    pub search_filter: String,

    pub pdf: FileSelector,
    pub document: Option<UploadedDocument>,

    pub search_results: Option<(String, SearchResults)>,
    pub is_searching: bool,

    notifications: VecDeque<Notification>,
    backend: Option<Backend>,
    active_stream: Option<ActiveStream>,
    /// Start or load request whose result may replace the conversation
    pending_request: Option<Uuid>,
    event_tx: Sender<ClientEvent>,
    event_rx: Receiver<ClientEvent>,

    voice: Option<VoiceSession>,
    player: Option<AudioPlayer>,
    recognizer: SpeechRecognizer<BoxedRecognitionEngine>,
    synthesizer: SpeechSynthesizer,
}

impl AppState {
    /// State without a network backend; every remote operation reports an error
    pub fn offline(config: ClientConfig, session: SessionContext) -> Self {
        let (event_tx, event_rx) = unbounded();
        let recognizer = SpeechRecognizer::new(None, &config.speech);
        Self {
            pdf: FileSelector::new(UploadLimits::from(config.upload.clone())),
            conversation: Conversation::new(ChatMode::default()),
            config,
            session,
            input_text: String::new(),
            streaming_text: String::new(),
            is_typing: false,
            chats: Vec::new(),
            search_filter: String::new(),
            document: None,
            search_results: None,
            is_searching: false,
            notifications: VecDeque::new(),
            backend: None,
            active_stream: None,
            pending_request: None,
            event_tx,
            event_rx,
            voice: None,
            player: None,
            recognizer,
            synthesizer: SpeechSynthesizer::unsupported(),
        }
    }

    /// State backed by the VoxAI service
    pub fn connect(config: ClientConfig, session: SessionContext) -> Result<Self> {
        let runtime = Runtime::new()
            .map_err(|e| VoxError::ConfigError(format!("Failed to create runtime: {}", e)))?;
        let api = Arc::new(ApiClient::new(&config)?.with_session(&session));
        let streamer = ChatStreamer::new(runtime.handle().clone());
        let stream_rx = streamer.event_receiver();

        let mut state = Self::offline(config, session);
        state.backend = Some(Backend {
            api,
            streamer,
            stream_rx,
            runtime,
        });
        info!("Connected to {}", state.config.api.base_url);
        Ok(state)
    }

    /// Plug in native speech engines
    pub fn with_speech(
        mut self,
        recognition: Option<BoxedRecognitionEngine>,
        synthesizer: SpeechSynthesizer,
    ) -> Self {
        self.recognizer = SpeechRecognizer::new(recognition, &self.config.speech);
        self.synthesizer = synthesizer;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    pub fn mode(&self) -> ChatMode {
        self.conversation.mode()
    }

    pub fn is_streaming(&self) -> bool {
        self.active_stream.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.is_typing || self.active_stream.is_some()
    }

    pub fn notifications(&self) -> &VecDeque<Notification> {
        &self.notifications
    }

    pub fn dismiss_notification(&mut self, index: usize) {
        self.notifications.remove(index);
    }

    pub fn notify(&mut self, title: impl Into<String>, description: impl Into<String>) {
        self.push_notification(title.into(), description.into(), false);
    }

    pub fn notify_error(&mut self, title: impl Into<String>, description: impl Into<String>) {
        self.push_notification(title.into(), description.into(), true);
    }

    fn push_notification(&mut self, title: String, description: String, is_error: bool) {
        if self.notifications.len() >= MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        self.notifications.push_back(Notification {
            title,
            description,
            is_error,
        });
    }

    /// Chat history after the search filter, grouped by mode
    pub fn visible_chats(&self) -> Vec<(ChatMode, Vec<&ChatSummary>)> {
        group_by_mode(&filter_by_title(&self.chats, &self.search_filter))
    }

    fn spawn<F, Fut>(&self, make: F) -> bool
    where
        F: FnOnce(Arc<ApiClient>) -> Fut,
        Fut: Future<Output = ClientEvent> + Send + 'static,
    {
        let Some(backend) = &self.backend else {
            return false;
        };
        let tx = self.event_tx.clone();
        let request = make(Arc::clone(&backend.api));
        backend.runtime.spawn(async move {
            let _ = tx.send(request.await);
        });
        true
    }

    fn require_user(&mut self) -> Option<String> {
        let user_id = self.session.user_id().map(str::to_string);
        if user_id.is_none() {
            self.notify_error("Not signed in", "Please sign in to continue.");
        }
        user_id
    }

    fn offline_error(&mut self) {
        self.notify_error("Error", "Not connected to the VoxAI service.");
    }

    /// Send the input text. A new conversation is created on the server with
    /// its first message; later messages stream their reply.
    pub fn send_message(&mut self) {
        let text = self.input_text.trim().to_string();
        if text.is_empty() || self.is_busy() {
            return;
        }
        let Some(user_id) = self.require_user() else {
            return;
        };
        let Some(backend) = &self.backend else {
            self.offline_error();
            return;
        };
        let mode = self.conversation.mode();

        match self.conversation.id.clone() {
            None => {
                let api = Arc::clone(&backend.api);
                let tx = self.event_tx.clone();
                let request_id = Uuid::new_v4();
                backend.runtime.spawn(async move {
                    let result = api.start_chat(&user_id, mode, &text).await;
                    let _ = tx.send(ClientEvent::ChatStarted {
                        request_id,
                        mode,
                        result,
                    });
                });
                self.pending_request = Some(request_id);
            }
            Some(chat_id) => {
                let tentative_id = self
                    .conversation
                    .messages
                    .apply_tentative(Message::tentative(Role::User, text.clone()));
                let request_id =
                    backend
                        .streamer
                        .send(Arc::clone(&backend.api), chat_id, text, mode);
                self.streaming_text.clear();
                self.active_stream = Some(ActiveStream {
                    request_id,
                    tentative_id,
                    mode,
                });
            }
        }

        self.is_typing = true;
        self.input_text.clear();
    }

    /// Change the mode of the current conversation; refused once it has messages
    pub fn set_mode(&mut self, mode: ChatMode) -> Result<()> {
        if mode != self.conversation.mode() && self.is_busy() {
            let err = VoxError::ValidationError(
                "Wait for the current reply before switching modes.".into(),
            );
            self.notify_error("Mode locked", err.user_message());
            return Err(err);
        }
        if let Err(e) = self.conversation.set_mode(mode) {
            self.notify_error("Mode locked", e.user_message());
            return Err(e);
        }
        Ok(())
    }

    /// Start over with an empty smart-mode conversation
    pub fn new_chat(&mut self) {
        self.reset_conversation();
        self.notify("New Chat Started", "");
    }

    fn reset_conversation(&mut self) {
        if let (Some(active), Some(backend)) = (self.active_stream.take(), &self.backend) {
            backend.streamer.cancel(active.request_id);
        }
        self.pending_request = None;
        self.conversation = Conversation::new(ChatMode::Smart);
        self.streaming_text.clear();
        self.is_typing = false;
        self.pdf.clear();
        self.document = None;
        self.search_results = None;
    }

    pub fn load_chats(&mut self) {
        let spawned = self.spawn(|api| async move {
            ClientEvent::ChatsLoaded(api.list_chats().await)
        });
        if !spawned {
            debug!("Skipping chat list refresh while offline");
        }
    }

    pub fn load_chat(&mut self, chat_id: &str) {
        let id = chat_id.to_string();
        let request_id = Uuid::new_v4();
        let spawned = self.spawn(|api| async move {
            let result = api.chat_messages(&id).await;
            ClientEvent::ChatLoaded {
                request_id,
                chat_id: id,
                result,
            }
        });
        if spawned {
            self.pending_request = Some(request_id);
            self.is_typing = true;
        } else {
            self.offline_error();
        }
    }

    pub fn delete_chat(&mut self, chat_id: &str) {
        let id = chat_id.to_string();
        let spawned = self.spawn(|api| async move {
            let result = api.delete_chat(&id).await;
            ClientEvent::ChatDeleted { chat_id: id, result }
        });
        if !spawned {
            self.offline_error();
        }
    }

    pub fn is_voice_active(&self) -> bool {
        self.voice.as_ref().is_some_and(|v| v.is_active())
    }

    /// Start or stop the voice session using the default microphone
    pub fn toggle_voice(&mut self) {
        if self.voice.is_some() {
            self.stop_voice();
            return;
        }

        #[cfg(feature = "audio-io")]
        {
            match crate::audio::AudioInput::new() {
                Ok(input) => self.start_voice(Box::new(input)),
                Err(e) => {
                    error!("Audio capture error: {}", e);
                    self.notify_error("Microphone Error", e.user_message());
                }
            }
        }

        #[cfg(not(feature = "audio-io"))]
        self.notify_error("Voice unavailable", "This build has no audio capture support.");
    }

    /// Start a voice session capturing from `source`
    pub fn start_voice(&mut self, source: Box<dyn AudioSource>) {
        if self.voice.is_some() {
            return;
        }
        let Some(user_id) = self.require_user() else {
            return;
        };
        let Some(backend) = &self.backend else {
            self.offline_error();
            return;
        };

        let mode = self.conversation.mode();
        match VoiceSession::start(
            &self.config.voice,
            &user_id,
            mode,
            source,
            backend.runtime.handle(),
        ) {
            Ok(session) => {
                self.voice = Some(session);
                self.notify(
                    "Voice Mode Activated",
                    "Speak naturally, I'll detect when you're done.",
                );
            }
            Err(e) => {
                error!("Failed to start voice session: {}", e);
                self.notify_error("Microphone Error", e.user_message());
            }
        }
    }

    pub fn stop_voice(&mut self) {
        if let Some(mut session) = self.voice.take() {
            session.stop();
        }
    }

    /// Validate and upload a PDF for the current conversation
    pub fn select_pdf(&mut self, file: SelectedFile) -> Result<()> {
        if let Err(e) = self.pdf.select(file.clone()) {
            self.notify_error("Upload Error", e.user_message());
            return Err(e);
        }
        self.upload_pdf(file)
    }

    /// Like [`select_pdf`](Self::select_pdf), but checks the file on disk before loading it
    pub fn select_pdf_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if let Err(e) = self.pdf.select_path(path) {
            self.notify_error("Upload Error", e.user_message());
            return Err(e);
        }
        match self.pdf.selected().cloned() {
            Some(file) => self.upload_pdf(file),
            None => Ok(()),
        }
    }

    fn upload_pdf(&mut self, file: SelectedFile) -> Result<()> {
        let Some(user_id) = self.require_user() else {
            self.pdf.clear();
            return Err(VoxError::SessionError("Not signed in".into()));
        };

        let file_name = file.name.clone();
        let spawned = self.spawn(|api| async move {
            let result = api.upload_pdf(&user_id, &file).await;
            ClientEvent::DocumentUploaded { file_name, result }
        });
        if !spawned {
            self.pdf.clear();
            self.offline_error();
            return Err(VoxError::TransportError("Not connected".into()));
        }
        self.is_typing = true;
        Ok(())
    }

    pub fn remove_pdf(&mut self) {
        self.pdf.clear();
        self.document = None;
        self.notify("PDF Removed", "You can upload a new document anytime.");
    }

    pub fn web_search(&mut self, query: &str) {
        let query = query.trim().to_string();
        if query.is_empty() {
            self.notify_error("Search", "Enter something to search for.");
            return;
        }
        let spawned = self.spawn(|api| async move {
            let result = api.search(&query).await;
            ClientEvent::SearchCompleted { query, result }
        });
        if spawned {
            self.is_searching = true;
        } else {
            self.offline_error();
        }
    }

    pub fn is_dictating(&self) -> bool {
        self.recognizer.is_listening()
    }

    pub fn dictation_supported(&self) -> bool {
        self.recognizer.is_supported()
    }

    pub fn start_dictation(&mut self) {
        if let Err(e) = self.recognizer.start(Instant::now()) {
            self.notify_error("Speech Recognition", e.user_message());
        }
    }

    pub fn stop_dictation(&mut self) {
        self.recognizer.stop();
    }

    /// Drain everything that happened since the last frame
    pub fn poll_events(&mut self) {
        let events: Vec<ClientEvent> = self.event_rx.try_iter().collect();
        for event in events {
            self.handle_client_event(event);
        }

        let stream_events: Vec<StreamEvent> = self
            .backend
            .as_ref()
            .map(|b| b.stream_rx.try_iter().collect())
            .unwrap_or_default();
        for event in stream_events {
            self.handle_stream_event(event);
        }

        let voice_events = self
            .voice
            .as_mut()
            .map(|v| v.poll_events())
            .unwrap_or_default();
        for event in voice_events {
            self.handle_voice_event(event);
        }

        for event in self.recognizer.tick(Instant::now()) {
            self.handle_recognition_event(event);
        }

        if self.synthesizer.poll_finished() {
            debug!("Finished speaking reply");
        }
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::ChatStarted {
                request_id,
                mode,
                result,
            } => {
                if self.pending_request != Some(request_id) {
                    debug!("Ignoring chat started for an abandoned conversation");
                    // The chat still exists on the server
                    if result.is_ok() {
                        self.load_chats();
                    }
                    return;
                }
                self.pending_request = None;
                self.is_typing = false;
                match result {
                    Ok(started) => {
                        if let Err(e) =
                            self.conversation
                                .attach(started.chat_id, started.title, mode)
                        {
                            warn!("Not attaching started chat: {}", e);
                            self.notify_error("Error", e.user_message());
                            return;
                        }
                        let reply = started.assistant_message.content.clone();
                        self.conversation
                            .messages
                            .replace_all(vec![started.user_message, started.assistant_message]);
                        self.load_chats();
                        self.speak_reply(mode, &reply);
                    }
                    Err(e) => {
                        warn!("Failed to start chat: {}", e);
                        self.notify_error("Error", e.user_message());
                    }
                }
            }
            ClientEvent::ChatsLoaded(result) => match result {
                Ok(chats) => self.chats = chats,
                Err(e) => error!("Failed to load chats: {}", e),
            },
            ClientEvent::ChatLoaded {
                request_id,
                chat_id,
                result,
            } => {
                if self.pending_request != Some(request_id) {
                    debug!("Ignoring stale history for chat {}", chat_id);
                    return;
                }
                self.pending_request = None;
                self.is_typing = false;
                match result {
                    Ok(messages) => {
                        let (title, mode) = self
                            .chats
                            .iter()
                            .find(|c| c.id == chat_id)
                            .map(|c| (c.title.clone(), c.mode))
                            .unwrap_or_else(|| (String::new(), self.conversation.mode()));
                        self.reset_conversation();
                        if let Err(e) = self.conversation.attach(chat_id, title, mode) {
                            warn!("Not attaching loaded chat: {}", e);
                        }
                        self.conversation.messages.replace_all(messages);
                    }
                    Err(e) => {
                        warn!("Failed to load chat {}: {}", chat_id, e);
                        self.notify_error("Error", "Failed to load chat history");
                    }
                }
            }
            ClientEvent::ChatDeleted { chat_id, result } => match result {
                Ok(()) => {
                    self.chats.retain(|c| c.id != chat_id);
                    if self.conversation.id.as_deref() == Some(chat_id.as_str()) {
                        self.reset_conversation();
                    }
                    self.notify("Chat deleted", "");
                }
                Err(e) => self.notify_error("Error", e.user_message()),
            },
            ClientEvent::DocumentUploaded { file_name, result } => {
                self.is_typing = false;
                match result {
                    Ok(document) => {
                        self.document = Some(document);
                        self.notify("PDF Uploaded", format!("{} is ready for questions", file_name));
                    }
                    Err(e) => {
                        self.pdf.clear();
                        let detail = match &e {
                            VoxError::ApiError { detail, .. } => detail.clone(),
                            _ => "Failed to upload PDF".to_string(),
                        };
                        self.notify_error("Upload Error", detail);
                    }
                }
            }
            ClientEvent::SearchCompleted { query, result } => {
                self.is_searching = false;
                match result {
                    Ok(results) => self.search_results = Some((query, results)),
                    Err(e) => self.notify_error("Search Error", e.user_message()),
                }
            }
        }
    }

    fn handle_stream_event(&mut self, event: StreamEvent) {
        let Some(active) = self.active_stream.clone() else {
            return;
        };
        if event.request_id() != active.request_id {
            debug!("Ignoring event for stale request {}", event.request_id());
            return;
        }

        match event {
            StreamEvent::Chunk { text, .. } => {
                self.streaming_text.push_str(&text);
            }
            StreamEvent::Complete { full_text, .. } => {
                self.active_stream = None;
                self.conversation.messages.confirm(&active.tentative_id, None);
                self.conversation
                    .messages
                    .add(Message::assistant(full_text.clone()));
                self.streaming_text.clear();
                self.is_typing = false;
                self.load_chats();
                self.speak_reply(active.mode, &full_text);
            }
            StreamEvent::Failed { error, .. } => {
                self.active_stream = None;
                self.conversation.messages.rollback(&active.tentative_id);
                self.streaming_text.clear();
                self.is_typing = false;
                let description = match &error {
                    VoxError::ApiError { detail, .. } => detail.clone(),
                    _ => "Failed to send message".to_string(),
                };
                self.notify_error("Error", description);
            }
        }
    }

    fn handle_voice_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::Connected => debug!("Voice session connected"),
            VoiceEvent::Transcript(message) => self.conversation.messages.add(message),
            VoiceEvent::Reply { message, audio } => {
                self.conversation.messages.add(message);
                if let Some(bytes) = audio {
                    self.play_reply_audio(bytes);
                }
            }
            VoiceEvent::ServerError { message, error } => {
                warn!("Voice service error: {}", error);
                let description = message.content.clone();
                self.conversation.messages.add(message);
                self.notify_error("Voice Error", description);
            }
            VoiceEvent::Error(e) => {
                let description = match &e {
                    VoxError::TransportError(_) => "Failed to connect to voice service".to_string(),
                    other => other.user_message(),
                };
                self.notify_error("Connection Error", description);
            }
            VoiceEvent::Closed { by_user } => {
                self.voice = None;
                if !by_user {
                    self.notify("Voice session ended", "Start voice mode again to continue.");
                }
            }
        }
    }

    fn handle_recognition_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Transcript(text) => {
                if !self.input_text.is_empty() && !self.input_text.ends_with(' ') {
                    self.input_text.push(' ');
                }
                self.input_text.push_str(&text);
            }
            RecognitionEvent::Error(e) => {
                self.notify_error("Speech Recognition Error", e.user_message());
            }
            RecognitionEvent::Ended => debug!("Dictation ended"),
        }
    }

    fn play_reply_audio(&mut self, bytes: Vec<u8>) {
        if self.player.is_none() {
            match AudioPlayer::new() {
                Ok(player) => self.player = Some(player),
                Err(e) => {
                    warn!("No audio output for reply: {}", e);
                    return;
                }
            }
        }
        if let Some(player) = self.player.as_mut() {
            if let Err(e) = player.play_encoded(bytes) {
                warn!("Could not play reply audio: {}", e);
                self.notify_error("Playback Error", e.user_message());
            }
        }
    }

    /// Read a typed reply aloud while a voice session runs in voice mode
    fn speak_reply(&mut self, mode: ChatMode, text: &str) {
        if mode != ChatMode::Voice || !self.is_voice_active() || !self.synthesizer.is_supported() {
            return;
        }
        if let Err(e) = self.synthesizer.speak(text, SpeakOptions::default()) {
            self.notify_error("Text-to-Speech Error", e.user_message());
        }
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.stop_voice();
        self.recognizer.stop();
    }
}
