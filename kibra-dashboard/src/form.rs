/**
 * FORMULAIRE DE CONFIGURATION - Édition de `/db/cfg`
 *
 * RÔLE :
 * Schéma statique des options éditables, validation des saisies et
 * machine à états de la soumission :
 *
 *   Loading -> Ready -> Submitting -> ReloadScheduled
 *                                  -> ErrorShown -> Submitting ...
 *
 * La soumission envoie le document complet (document chargé + saisies),
 * le border router remplace sa configuration en entier. Pas de retry
 * automatique : après une erreur, c'est l'utilisateur qui resoumet.
 */

use crate::models::ConfigDocument;
use crate::table::escape;
use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;

pub const DEFAULT_RELOAD_DELAY: Duration = Duration::from_millis(3500);

const ACTIONS: &[&str] = &["none", "start", "stop"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "choices")]
pub enum FieldKind {
    Choice(&'static [&'static str]),
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub name: &'static str,
    pub title: &'static str,
    pub kind: FieldKind,
}

const fn action(name: &'static str, title: &'static str) -> FieldSchema {
    FieldSchema { name, title, kind: FieldKind::Choice(ACTIONS) }
}

const fn status(name: &'static str, title: &'static str) -> FieldSchema {
    FieldSchema { name, title, kind: FieldKind::ReadOnly }
}

pub static CONFIG_SCHEMA: [FieldSchema; 12] = [
    action("action_dhcp", "Action DHCPv6"),
    action("action_mdns", "Action mDNS"),
    action("action_nat", "Action NAT64"),
    action("action_network", "Action Network"),
    action("action_diags", "Action Diagnostics"),
    action("action_serial", "Action KSH"),
    status("status_dhcp", "Status DHCPv6"),
    status("status_mdns", "Status mDNS"),
    status("status_nat", "Status NAT64"),
    status("status_network", "Status Network"),
    status("status_diags", "Status Diagnostics"),
    status("status_serial", "Status KSH"),
];

pub fn field(name: &str) -> Option<&'static FieldSchema> {
    CONFIG_SCHEMA.iter().find(|f| f.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("unknown field {0}")]
    Unknown(String),
    #[error("{field}: {value:?} is not one of {choices:?}")]
    InvalidChoice { field: String, value: String, choices: &'static [&'static str] },
    #[error("{0} is read-only")]
    ReadOnly(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("Errors.")]
    Invalid(Vec<FieldError>),
    #[error("cannot {action} while the form is {state}")]
    InvalidState { action: &'static str, state: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum FormState {
    Loading,
    Ready,
    Submitting,
    ReloadScheduled { reload_after_ms: u64 },
    ErrorShown { message: String },
}

impl FormState {
    pub fn name(&self) -> &'static str {
        match self {
            FormState::Loading => "loading",
            FormState::Ready => "ready",
            FormState::Submitting => "submitting",
            FormState::ReloadScheduled { .. } => "reload_scheduled",
            FormState::ErrorShown { .. } => "error_shown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigForm {
    state: FormState,
    loaded: ConfigDocument,
    pending: Option<ConfigDocument>,
    errors: Vec<FieldError>,
    submitted_len: Option<usize>,
    reload_delay: Duration,
}

impl Default for ConfigForm {
    fn default() -> Self {
        Self::new(DEFAULT_RELOAD_DELAY)
    }
}

impl ConfigForm {
    pub fn new(reload_delay: Duration) -> Self {
        Self {
            state: FormState::Loading,
            loaded: ConfigDocument::new(),
            pending: None,
            errors: Vec::new(),
            submitted_len: None,
            reload_delay,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.loaded
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Document reçu de `GET /db/cfg`. Ignoré pendant une soumission.
    pub fn loaded(&mut self, document: ConfigDocument) -> Result<(), FormError> {
        if self.state == FormState::Submitting {
            return Err(FormError::InvalidState { action: "load", state: self.state.name() });
        }
        self.loaded = document;
        self.errors.clear();
        self.submitted_len = None;
        self.state = FormState::Ready;
        Ok(())
    }

    pub fn validate(&self, edits: &[(String, String)]) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for (name, value) in edits {
            match field(name).map(|f| f.kind) {
                None => errors.push(FieldError::Unknown(name.clone())),
                Some(FieldKind::Choice(choices)) => {
                    if !choices.contains(&value.as_str()) {
                        errors.push(FieldError::InvalidChoice { field: name.clone(), value: value.clone(), choices });
                    }
                }
                Some(FieldKind::ReadOnly) => {
                    if value != self.loaded.get(name).unwrap_or_default() {
                        errors.push(FieldError::ReadOnly(name.clone()));
                    }
                }
            }
        }
        errors
    }

    /// Valide les saisies et produit le document complet à envoyer.
    pub fn begin_submit<I>(&mut self, edits: I) -> Result<ConfigDocument, FormError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if !matches!(self.state, FormState::Ready | FormState::ErrorShown { .. }) {
            return Err(FormError::InvalidState { action: "submit", state: self.state.name() });
        }
        let edits: Vec<(String, String)> = edits.into_iter().collect();
        let errors = self.validate(&edits);
        if !errors.is_empty() {
            self.errors = errors.clone();
            self.submitted_len = None;
            return Err(FormError::Invalid(errors));
        }

        let mut document = self.loaded.clone();
        for (name, value) in edits {
            document.set(name, value);
        }
        self.errors.clear();
        self.submitted_len = Some(document.len());
        self.pending = Some(document.clone());
        self.state = FormState::Submitting;
        Ok(document)
    }

    /// Rechargement raté après une soumission : on quitte `ReloadScheduled`
    /// pour que la page ne reprogramme pas de rechargement en boucle.
    pub fn load_failed(&mut self, message: impl Into<String>) {
        if let FormState::ReloadScheduled { .. } = self.state {
            self.state = FormState::ErrorShown { message: message.into() };
        }
    }

    pub fn submit_succeeded(&mut self) -> Result<Duration, FormError> {
        if self.state != FormState::Submitting {
            return Err(FormError::InvalidState { action: "complete", state: self.state.name() });
        }
        if let Some(document) = self.pending.take() {
            self.loaded = document;
        }
        self.state = FormState::ReloadScheduled { reload_after_ms: self.reload_delay.as_millis() as u64 };
        Ok(self.reload_delay)
    }

    pub fn submit_failed(&mut self, message: impl Into<String>) -> Result<(), FormError> {
        if self.state != FormState::Submitting {
            return Err(FormError::InvalidState { action: "fail", state: self.state.name() });
        }
        self.pending = None;
        self.state = FormState::ErrorShown { message: message.into() };
        Ok(())
    }

    pub fn render_html(&self) -> String {
        if self.state == FormState::Loading {
            return String::from("<p class=\"loading\">Loading configuration...</p>\n");
        }

        let mut html = String::from("<form method=\"post\" action=\"/config\">\n");
        for field in &CONFIG_SCHEMA {
            let current = self.loaded.get(field.name).unwrap_or_default();
            let _ = write!(html, "<label for=\"{0}\">{1}</label>", field.name, escape(field.title));
            match field.kind {
                FieldKind::Choice(choices) => {
                    let _ = write!(html, "<select id=\"{0}\" name=\"{0}\">", field.name);
                    for choice in choices {
                        let selected = if *choice == current { " selected" } else { "" };
                        let _ = write!(html, "<option value=\"{choice}\"{selected}>{choice}</option>");
                    }
                    html.push_str("</select>\n");
                }
                FieldKind::ReadOnly => {
                    let _ = writeln!(
                        html,
                        "<input id=\"{0}\" name=\"{0}\" value=\"{1}\" readonly>",
                        field.name,
                        escape(current)
                    );
                }
            }
        }
        let disabled = if self.state == FormState::Submitting { " disabled" } else { "" };
        let _ = writeln!(html, "<button type=\"submit\"{disabled}>Submit</button>\n</form>");

        html.push_str("<div id=\"res\">");
        if !self.errors.is_empty() {
            html.push_str("<p>Errors.</p><ul>");
            for error in &self.errors {
                let _ = write!(html, "<li>{}</li>", escape(&error.to_string()));
            }
            html.push_str("</ul>");
        } else if let Some(len) = self.submitted_len {
            let _ = write!(html, "<p>Number of elements: {len}</p>");
        }
        if let FormState::ErrorShown { message } = &self.state {
            let _ = write!(html, "<p class=\"error\">{}</p>", escape(message));
        }
        html.push_str("</div>\n");

        if let FormState::ReloadScheduled { reload_after_ms } = self.state {
            let _ = writeln!(
                html,
                "<script>setTimeout(function () {{ window.location.reload(false); }}, {reload_after_ms});</script>"
            );
        }
        html
    }
}
