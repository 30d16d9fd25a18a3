use axum::{
    Router,
    extract::{Multipart, State},
    http::{StatusCode, Uri},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What the fake storage endpoint answers to every POST
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
    pub delay: Duration,
}

impl Default for Reply {
    fn default() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: String::new(),
            delay: Duration::ZERO,
        }
    }
}

/// A multipart form POST as received by the server
#[derive(Clone, Debug)]
pub struct RecordedPost {
    pub path: String,
    pub fields: HashMap<String, String>,
    pub field_order: Vec<String>,
    pub file_name: Option<String>,
    pub file: Vec<u8>,
}

#[derive(Clone)]
struct ServerState {
    reply: Reply,
    posts: Arc<Mutex<Vec<RecordedPost>>>,
}

async fn receive_upload(
    State(state): State<ServerState>,
    uri: Uri,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    let mut post = RecordedPost {
        path: uri.path().to_string(),
        fields: HashMap::new(),
        field_order: Vec::new(),
        file_name: None,
        file: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        post.field_order.push(name.clone());
        if name == "file" {
            post.file_name = field.file_name().map(str::to_string);
            post.file = field.bytes().await.unwrap().to_vec();
        } else {
            post.fields.insert(name, field.text().await.unwrap());
        }
    }
    state.posts.lock().unwrap().push(post);

    tokio::time::sleep(state.reply.delay).await;
    (state.reply.status, state.reply.body.clone())
}

/// Fake S3 POST endpoint on a random port; shuts down on drop
pub struct PostServer {
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    #[allow(dead_code)] // Keep handle alive to prevent task abort
    handle: JoinHandle<()>,
    posts: Arc<Mutex<Vec<RecordedPost>>>,
    pub url: String,
}

impl PostServer {
    pub async fn start(reply: Reply) -> Self {
        let posts = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            reply,
            posts: posts.clone(),
        };
        let app = Router::new().fallback(receive_upload).with_state(state);

        // Bind to a random available port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        PostServer {
            shutdown_tx: Some(shutdown_tx),
            handle,
            posts,
            url: format!("http://{}", addr),
        }
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }
}

impl Drop for PostServer {
    fn drop(&mut self) {
        // Signal shutdown (ignore errors if already shut down)
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
