use folio_core::{BookState, RecommendError, Recommendation};

use crate::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Missing,
    Editing {
        input: String,
        remember: bool,
        previous: Option<String>,
    },
    Ready {
        key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    InFlight { ticket: u64, title: String },
    Completed(Vec<Recommendation>),
}

/// Work order for a recommender call, executed off the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationRequest {
    pub ticket: u64,
    pub title: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct RecommendationsPanel {
    credential: Credential,
    request: RequestState,
    next_ticket: u64,
}

impl RecommendationsPanel {
    /// A persisted key wins over `fallback_key` (from the environment).
    pub fn new(state: &BookState, fallback_key: Option<String>) -> Self {
        let key = state
            .gemini_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or(fallback_key.filter(|k| !k.trim().is_empty()));
        let credential = match key {
            Some(key) => Credential::Ready { key },
            None => Credential::Missing,
        };
        Self {
            credential,
            request: RequestState::Idle,
            next_ticket: 1,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn request_state(&self) -> &RequestState {
        &self.request
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.credential, Credential::Editing { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.request, RequestState::InFlight { .. })
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        match &self.request {
            RequestState::Completed(list) => list.as_slice(),
            _ => &[],
        }
    }

    pub fn begin_credential_input(&mut self) {
        let previous = match &self.credential {
            Credential::Ready { key } => Some(key.clone()),
            Credential::Editing { .. } => return,
            Credential::Missing => None,
        };
        self.credential = Credential::Editing {
            input: String::new(),
            remember: false,
            previous,
        };
    }

    pub fn push_char(&mut self, ch: char) {
        if let Credential::Editing { input, .. } = &mut self.credential
            && !ch.is_control()
        {
            input.push(ch);
        }
    }

    pub fn pop_char(&mut self) {
        if let Credential::Editing { input, .. } = &mut self.credential {
            input.pop();
        }
    }

    pub fn clear_input(&mut self) {
        if let Credential::Editing { input, .. } = &mut self.credential {
            input.clear();
        }
    }

    pub fn toggle_remember(&mut self) {
        if let Credential::Editing { remember, .. } = &mut self.credential {
            *remember = !*remember;
        }
    }

    pub fn cancel_credential_input(&mut self) {
        if let Credential::Editing { previous, .. } = &self.credential {
            self.credential = match previous {
                Some(key) => Credential::Ready { key: key.clone() },
                None => Credential::Missing,
            };
        }
    }

    /// Accepts the typed key; persists it when `remember` is set.
    pub fn confirm_credential(&mut self, store: &mut Store) -> bool {
        let Credential::Editing {
            input, remember, ..
        } = &self.credential
        else {
            return false;
        };
        let key = input.trim().to_string();
        if key.is_empty() {
            return false;
        }
        if *remember {
            store.set_gemini_api_key(key.clone());
        }
        self.credential = Credential::Ready { key };
        true
    }

    /// Starts a request unless one is already running or no key is set.
    pub fn request(&mut self, title: &str) -> Option<RecommendationRequest> {
        let Credential::Ready { key } = &self.credential else {
            return None;
        };
        let api_key = key.clone();
        if self.is_loading() {
            return None;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.request = RequestState::InFlight {
            ticket,
            title: title.to_string(),
        };
        Some(RecommendationRequest {
            ticket,
            title: title.to_string(),
            api_key,
        })
    }

    /// Applies a finished request. Results for superseded tickets are
    /// dropped; returns whether the panel changed.
    pub fn finish(
        &mut self,
        ticket: u64,
        result: Result<Vec<Recommendation>, RecommendError>,
    ) -> bool {
        let RequestState::InFlight {
            ticket: current,
            title,
        } = &self.request
        else {
            return false;
        };
        if *current != ticket {
            return false;
        }
        let title = title.clone();

        self.request = match result {
            Ok(list) => {
                tracing::info!(title = %title, count = list.len(), "recommendations received");
                RequestState::Completed(list)
            }
            Err(err) => {
                tracing::error!(title = %title, error = %err, "error getting recommendations");
                RequestState::Idle
            }
        };
        true
    }

    /// Forgets results and orphans any in-flight request.
    pub fn reset(&mut self) {
        self.request = RequestState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryPersistence;

    fn rec(title: &str) -> Recommendation {
        Recommendation {
            title: title.to_string(),
            description: format!("about {title}"),
        }
    }

    fn type_key(panel: &mut RecommendationsPanel, key: &str) {
        panel.begin_credential_input();
        for ch in key.chars() {
            panel.push_char(ch);
        }
    }

    #[test]
    fn starts_missing_without_any_key() {
        let panel = RecommendationsPanel::new(&BookState::default(), None);
        assert_eq!(panel.credential(), &Credential::Missing);
    }

    #[test]
    fn stored_key_beats_fallback() {
        let state = BookState {
            gemini_api_key: Some("stored".to_string()),
            ..Default::default()
        };
        let panel = RecommendationsPanel::new(&state, Some("env".to_string()));
        assert_eq!(
            panel.credential(),
            &Credential::Ready {
                key: "stored".to_string()
            }
        );
    }

    #[test]
    fn request_requires_credential() {
        let mut panel = RecommendationsPanel::new(&BookState::default(), None);
        assert!(panel.request("Dune").is_none());
        assert_eq!(panel.request_state(), &RequestState::Idle);
    }

    #[test]
    fn confirmed_key_is_persisted_only_when_remembered() {
        let mut store = Store::open(Box::new(MemoryPersistence::new()));
        let mut panel = RecommendationsPanel::new(store.state(), None);

        type_key(&mut panel, "k1");
        assert!(panel.confirm_credential(&mut store));
        assert!(store.state().gemini_api_key.is_none());

        type_key(&mut panel, "k2");
        panel.toggle_remember();
        assert!(panel.confirm_credential(&mut store));
        assert_eq!(store.state().gemini_api_key.as_deref(), Some("k2"));
    }

    #[test]
    fn blank_key_is_rejected_and_cancel_restores_previous() {
        let mut store = Store::open(Box::new(MemoryPersistence::new()));
        let mut panel = RecommendationsPanel::new(store.state(), Some("env".to_string()));
        type_key(&mut panel, "   ");
        assert!(!panel.confirm_credential(&mut store));
        assert!(panel.is_editing());
        panel.cancel_credential_input();
        assert_eq!(
            panel.credential(),
            &Credential::Ready {
                key: "env".to_string()
            }
        );
    }

    #[test]
    fn completes_with_results() {
        let mut panel = RecommendationsPanel::new(&BookState::default(), Some("k".into()));
        let request = panel.request("Dune");
        let ticket = request.as_ref().map(|r| r.ticket).unwrap_or_default();
        assert_eq!(request.map(|r| r.api_key), Some("k".to_string()));
        assert!(panel.is_loading());
        assert!(panel.request("Dune").is_none());

        assert!(panel.finish(ticket, Ok(vec![rec("Hyperion")])));
        assert_eq!(panel.recommendations(), &[rec("Hyperion")]);
    }

    #[test]
    fn failure_reverts_to_idle_without_results() {
        let mut panel = RecommendationsPanel::new(&BookState::default(), Some("k".into()));
        let ticket = panel.request("Dune").map(|r| r.ticket).unwrap_or_default();
        let err = RecommendError::Parse {
            message: "not json".to_string(),
        };
        assert!(panel.finish(ticket, Err(err)));
        assert_eq!(panel.request_state(), &RequestState::Idle);
        assert!(panel.recommendations().is_empty());
    }

    #[test]
    fn stale_ticket_is_ignored_after_reset() {
        let mut panel = RecommendationsPanel::new(&BookState::default(), Some("k".into()));
        let first = panel.request("Dune").map(|r| r.ticket).unwrap_or_default();
        panel.reset();
        let second = panel.request("Emma").map(|r| r.ticket).unwrap_or_default();
        assert_ne!(first, second);

        assert!(!panel.finish(first, Ok(vec![rec("stale")])));
        assert!(panel.is_loading());
        assert!(panel.finish(second, Ok(vec![rec("fresh")])));
        assert_eq!(panel.recommendations(), &[rec("fresh")]);
    }
}
