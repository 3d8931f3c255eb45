#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Mutex;

use axum::Router;
use pgadmin4_runtime::presentation::{MenuState, Presenter, Progress};

/// Serve `app` on an ephemeral loopback port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Presenter that only remembers status lines and progress values.
#[derive(Default)]
pub struct QuietPresenter {
    pub statuses: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<Progress>>,
    pub menus: Mutex<Vec<MenuState>>,
    pub notifications: Mutex<Vec<String>>,
}

impl Presenter for QuietPresenter {
    fn set_status(&self, text: &str) {
        self.statuses.lock().unwrap().push(text.to_string());
    }
    fn show_main_window(&self, _url: &str) {}
    fn show_error(&self, _log: &str) {}
    fn alert(&self, _message: &str) {}
    fn notify(&self, message: &str) {
        self.notifications.lock().unwrap().push(message.to_string());
    }
    fn rebuild_menu(&self, state: &MenuState) {
        self.menus.lock().unwrap().push(*state);
    }
    fn set_badge(&self, _count: usize) {}
    fn clear_badge(&self) {}
    fn set_progress(&self, progress: Progress) {
        self.progress.lock().unwrap().push(progress);
    }
    fn clear_progress(&self) {}
}
