//! Server-side session token repository.

use axum::http::{header, Request};
use dashmap::DashMap;
use uuid::Uuid;

/// A session resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub token: String,
    /// Created by this request; the response must set the cookie.
    pub is_new: bool,
}

/// CSRF tokens keyed by session cookie.
#[derive(Debug)]
pub struct SessionStore {
    cookie_name: String,
    tokens: DashMap<String, String>,
}

impl SessionStore {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            tokens: DashMap::new(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Find the request's session, or start one. Unknown session ids are
    /// replaced rather than adopted.
    pub fn load_or_create<B>(&self, req: &Request<B>) -> Session {
        if let Some(id) = self.session_id(req) {
            if let Some(token) = self.tokens.get(&id) {
                return Session {
                    token: token.value().clone(),
                    id,
                    is_new: false,
                };
            }
        }

        let id = Uuid::new_v4().simple().to_string();
        let token = Uuid::new_v4().to_string();
        self.tokens.insert(id.clone(), token.clone());

        tracing::debug!(session = %id, "Created CSRF session");
        Session {
            id,
            token,
            is_new: true,
        }
    }

    /// `Set-Cookie` value for a session.
    pub fn cookie(&self, session: &Session) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name, session.id
        )
    }

    fn session_id<B>(&self, req: &Request<B>) -> Option<String> {
        req.headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.to_string())
    }
}
