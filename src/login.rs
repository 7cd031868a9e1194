use crate::models::AuthToken;
use crate::store::{DashboardStore, Pending};
use eframe::egui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    SignIn,
    SignUp,
}

/// Sign-in / sign-up modal shown until the backend hands out a token.
pub struct LoginWindow {
    mode: Mode,
    full_name: String,
    email: String,
    password: String,
    error: Option<String>,
    pending: Option<Pending<AuthToken>>,
}

impl LoginWindow {
    pub fn new() -> Self {
        Self {
            mode: Mode::SignIn,
            full_name: String::new(),
            email: String::new(),
            password: String::new(),
            error: None,
            pending: None,
        }
    }

    fn missing_field(&self) -> Option<&'static str> {
        if self.mode == Mode::SignUp && self.full_name.trim().is_empty() {
            Some("Full name is required")
        } else if self.email.trim().is_empty() {
            Some("Email is required")
        } else if self.password.is_empty() {
            Some("Password is required")
        } else {
            None
        }
    }

    fn submit(&mut self, store: &DashboardStore) {
        if let Some(message) = self.missing_field() {
            self.error = Some(message.to_string());
            return;
        }
        self.error = None;
        let email = self.email.trim();
        self.pending = Some(match self.mode {
            Mode::SignIn => store.login(email, &self.password),
            Mode::SignUp => store.register(self.full_name.trim(), email, &self.password),
        });
    }

    /// Draws the window. Returns the token once the backend accepted the
    /// credentials.
    pub fn show(&mut self, ctx: &egui::Context, store: &DashboardStore) -> Option<AuthToken> {
        if let Some(reply) = self.pending.as_ref().and_then(Pending::take) {
            self.pending = None;
            match reply {
                Ok(token) => {
                    self.password.clear();
                    return Some(token);
                }
                Err(message) => self.error = Some(message),
            }
        }

        let title = match self.mode {
            Mode::SignIn => "Sign in",
            Mode::SignUp => "Create account",
        };
        let busy = self.pending.is_some();
        let mut submitted = false;

        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_width(300.0);
                egui::Grid::new("login_form")
                    .num_columns(2)
                    .spacing([10.0, 8.0])
                    .show(ui, |ui| {
                        if self.mode == Mode::SignUp {
                            ui.label("Full name");
                            ui.text_edit_singleline(&mut self.full_name);
                            ui.end_row();
                        }
                        ui.label("Email");
                        ui.text_edit_singleline(&mut self.email);
                        ui.end_row();
                        ui.label("Password");
                        let password =
                            ui.add(egui::TextEdit::singleline(&mut self.password).password(true));
                        if password.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                            submitted = true;
                        }
                        ui.end_row();
                    });

                if let Some(error) = &self.error {
                    ui.add_space(5.0);
                    ui.colored_label(egui::Color32::from_rgb(200, 50, 50), error);
                }

                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    let label = if busy { "⏳ Please wait..." } else { title };
                    if ui
                        .add_enabled(
                            !busy,
                            egui::Button::new(
                                egui::RichText::new(label).color(egui::Color32::WHITE),
                            )
                            .fill(egui::Color32::from_rgb(0, 120, 215)),
                        )
                        .clicked()
                    {
                        submitted = true;
                    }

                    let switch = match self.mode {
                        Mode::SignIn => "Create an account",
                        Mode::SignUp => "I already have an account",
                    };
                    if ui.link(switch).clicked() {
                        self.mode = match self.mode {
                            Mode::SignIn => Mode::SignUp,
                            Mode::SignUp => Mode::SignIn,
                        };
                        self.error = None;
                    }
                });
            });

        if submitted && !busy {
            self.submit(store);
        }
        None
    }
}
