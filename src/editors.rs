use crate::models::Settings;
use crate::session::SYNC_DATA_INTERVAL_OPTIONS;
use crate::store::{detect_gateway, DashboardStore, Pending};
use crate::validation::{
    parse_known_devices, settings_errors, PORTS_TO_SCAN_OPTIONS, SCAN_INTERVAL_OPTIONS,
    TOKEN_EXPIRY_TIME_OPTIONS,
};
use eframe::egui;

const ERROR_COLOR: egui::Color32 = egui::Color32::from_rgb(200, 50, 50);

fn option_label(options: &[(&'static str, u64)], value: u64) -> String {
    options
        .iter()
        .find(|(_, option)| *option == value)
        .map(|(label, _)| label.to_string())
        .unwrap_or_else(|| value.to_string())
}

fn option_combo(ui: &mut egui::Ui, id: &str, options: &[(&'static str, u64)], value: &mut u64) {
    egui::ComboBox::from_id_source(id)
        .selected_text(option_label(options, *value))
        .show_ui(ui, |ui| {
            for (label, option) in options {
                ui.selectable_value(value, *option, *label);
            }
        });
}

fn show_errors(ui: &mut egui::Ui, errors: &[String]) {
    for error in errors {
        ui.colored_label(ERROR_COLOR, error);
    }
}

/// Scan and server settings, plus the client-side sync interval.
pub struct SettingsEditor {
    draft: Option<Settings>,
    sync_interval: u64,
    loading: Option<Pending<Settings>>,
    saving: Option<Pending<()>>,
    restarting: Option<Pending<()>>,
    errors: Vec<String>,
}

impl SettingsEditor {
    pub fn open(store: &DashboardStore) -> Self {
        Self {
            draft: None,
            sync_interval: store.session().sync_data_interval,
            loading: Some(store.load_settings()),
            saving: None,
            restarting: None,
            errors: Vec::new(),
        }
    }

    /// Applies finished replies. Returns `true` once the settings were saved.
    fn collect_replies(&mut self) -> bool {
        let mut saved = false;
        if let Some(reply) = self.loading.as_ref().and_then(Pending::take) {
            self.loading = None;
            match reply {
                Ok(settings) => self.draft = Some(settings),
                Err(message) => self.errors = vec![message],
            }
        }
        if let Some(reply) = self.saving.as_ref().and_then(Pending::take) {
            self.saving = None;
            match reply {
                Ok(()) => saved = true,
                Err(message) => self.errors = vec![message],
            }
        }
        if let Some(reply) = self.restarting.as_ref().and_then(Pending::take) {
            self.restarting = None;
            if let Err(message) = reply {
                self.errors = vec![message];
            }
        }
        saved
    }

    /// Returns `false` once the user closed the window or the settings were
    /// saved.
    pub fn show(&mut self, ctx: &egui::Context, store: &mut DashboardStore) -> bool {
        if self.collect_replies() {
            return false;
        }
        let mut open = true;
        egui::Window::new("⚙ Settings")
            .open(&mut open)
            .resizable(false)
            .default_width(420.0)
            .show(ctx, |ui| match self.draft.as_mut() {
                None => {
                    if self.loading.is_some() {
                        ui.spinner();
                    }
                    show_errors(ui, &self.errors);
                }
                Some(draft) => {
                    render_form(ui, draft, &mut self.sync_interval, &mut self.errors);
                    ui.add_space(8.0);
                    show_errors(ui, &self.errors);
                    ui.add_space(8.0);

                    let busy = self.saving.is_some() || self.restarting.is_some();
                    ui.horizontal(|ui| {
                        if ui
                            .add_enabled(
                                !busy,
                                egui::Button::new(
                                    egui::RichText::new("💾 Save").color(egui::Color32::WHITE),
                                )
                                .fill(egui::Color32::from_rgb(0, 120, 215)),
                            )
                            .clicked()
                        {
                            self.errors = settings_errors(draft);
                            if self.errors.is_empty() {
                                store.set_sync_interval(self.sync_interval);
                                self.saving = Some(store.save_settings(draft.clone()));
                            }
                        }
                        if ui
                            .add_enabled(!busy, egui::Button::new("🔄 Restart scan service"))
                            .clicked()
                        {
                            self.restarting = Some(store.restart_scan_service());
                        }
                        if ui
                            .add_enabled(!busy, egui::Button::new("🔄 Restart server"))
                            .clicked()
                        {
                            self.restarting = Some(store.restart_server_service());
                        }
                    });
                }
            });
        open
    }
}

fn render_form(
    ui: &mut egui::Ui,
    draft: &mut Settings,
    sync_interval: &mut u64,
    errors: &mut Vec<String>,
) {
    ui.label(egui::RichText::new("🔍 Scan").strong());
    egui::Grid::new("scan_settings")
        .num_columns(2)
        .spacing([20.0, 6.0])
        .show(ui, |ui| {
            ui.label("Network subnet");
            ui.text_edit_singleline(&mut draft.scan_settings.network_subnet);
            ui.end_row();

            ui.label("Scan interval");
            option_combo(
                ui,
                "scan_interval",
                &SCAN_INTERVAL_OPTIONS,
                &mut draft.scan_settings.scan_interval,
            );
            ui.end_row();

            ui.label("Ports to scan");
            egui::ComboBox::from_id_source("ports_to_scan")
                .selected_text(draft.scan_settings.ports_to_scan.to_string())
                .show_ui(ui, |ui| {
                    for option in PORTS_TO_SCAN_OPTIONS {
                        ui.selectable_value(
                            &mut draft.scan_settings.ports_to_scan,
                            option,
                            option.to_string(),
                        );
                    }
                });
            ui.end_row();
        });

    ui.add_space(8.0);
    ui.label(egui::RichText::new("🖧 Server").strong());
    egui::Grid::new("server_settings")
        .num_columns(2)
        .spacing([20.0, 6.0])
        .show(ui, |ui| {
            ui.label("Token expiry");
            option_combo(
                ui,
                "token_expiry",
                &TOKEN_EXPIRY_TIME_OPTIONS,
                &mut draft.server_settings.token_expiry_time,
            );
            ui.end_row();

            ui.label("Gateway IP");
            ui.text_edit_singleline(&mut draft.server_settings.gateway_ip);
            ui.end_row();

            ui.label("Gateway MAC");
            ui.text_edit_singleline(&mut draft.server_settings.gateway_mac);
            ui.end_row();

            ui.label("");
            if ui.button("🚪 Detect gateway").clicked() {
                apply_detected_gateway(draft, detect_gateway(), errors);
            }
            ui.end_row();
        });

    ui.add_space(8.0);
    ui.label(egui::RichText::new("🗘 Dashboard").strong());
    ui.horizontal(|ui| {
        ui.label("Sync data every");
        option_combo(ui, "sync_interval", &SYNC_DATA_INTERVAL_OPTIONS, sync_interval);
    });
}

/// Fills the gateway fields from a detection result, or reports why
/// detection failed.
fn apply_detected_gateway(
    draft: &mut Settings,
    detected: Result<(String, String), String>,
    errors: &mut Vec<String>,
) {
    match detected {
        Ok((ip, mac)) => {
            draft.server_settings.gateway_ip = ip;
            draft.server_settings.gateway_mac = mac;
        }
        Err(e) => {
            tracing::warn!("{}", e);
            *errors = vec![e];
        }
    }
}

/// JSON editor for the known-devices document.
pub struct KnownDevicesEditor {
    document: Option<String>,
    loading: Option<Pending<String>>,
    saving: Option<Pending<()>>,
    errors: Vec<String>,
}

impl KnownDevicesEditor {
    pub fn open(store: &DashboardStore) -> Self {
        Self {
            document: None,
            loading: Some(store.load_known_devices()),
            saving: None,
            errors: Vec::new(),
        }
    }

    /// Returns `false` once the user closed the window or the upload
    /// succeeded.
    pub fn show(&mut self, ctx: &egui::Context, store: &DashboardStore) -> bool {
        if let Some(reply) = self.loading.as_ref().and_then(Pending::take) {
            self.loading = None;
            match reply {
                Ok(document) => self.document = Some(document),
                Err(message) => self.errors = vec![message],
            }
        }
        if let Some(reply) = self.saving.as_ref().and_then(Pending::take) {
            self.saving = None;
            match reply {
                Ok(()) => return false,
                Err(message) => self.errors = vec![message],
            }
        }

        let mut open = true;
        egui::Window::new("📋 Known devices")
            .open(&mut open)
            .default_size([480.0, 420.0])
            .show(ctx, |ui| {
                let Some(document) = self.document.as_mut() else {
                    if self.loading.is_some() {
                        ui.spinner();
                    }
                    show_errors(ui, &self.errors);
                    return;
                };
                ui.label("Each entry needs a name, a MAC address and a type.");
                egui::ScrollArea::vertical()
                    .max_height(320.0)
                    .show(ui, |ui| {
                        ui.add(
                            egui::TextEdit::multiline(document)
                                .code_editor()
                                .desired_rows(16)
                                .desired_width(f32::INFINITY),
                        );
                    });
                show_errors(ui, &self.errors);
                ui.add_space(6.0);
                if ui
                    .add_enabled(
                        self.saving.is_none(),
                        egui::Button::new(
                            egui::RichText::new("💾 Upload").color(egui::Color32::WHITE),
                        )
                        .fill(egui::Color32::from_rgb(0, 120, 215)),
                    )
                    .clicked()
                {
                    match parse_known_devices(document.as_str()) {
                        Ok(_) => {
                            self.errors.clear();
                            self.saving = Some(store.save_known_devices(document.clone()));
                        }
                        Err(errors) => self.errors = errors,
                    }
                }
            });
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_option_values_use_their_label() {
        assert_eq!(option_label(&SCAN_INTERVAL_OPTIONS, 300), "5 Minutes");
        assert_eq!(option_label(&SYNC_DATA_INTERVAL_OPTIONS, 0), "Never");
        assert_eq!(option_label(&TOKEN_EXPIRY_TIME_OPTIONS, 7), "7");
    }

    fn editor(saving: Option<Pending<()>>) -> SettingsEditor {
        SettingsEditor {
            draft: Some(Settings::default()),
            sync_interval: 60,
            loading: None,
            saving,
            restarting: None,
            errors: Vec::new(),
        }
    }

    #[test]
    fn successful_save_closes_the_editor() {
        let mut saved = editor(Some(Pending::resolved(Ok(()))));
        assert!(saved.collect_replies());

        let mut rejected = editor(Some(Pending::resolved(Err("Invalid subnet".to_string()))));
        assert!(!rejected.collect_replies());
        assert_eq!(rejected.errors, vec!["Invalid subnet".to_string()]);

        let mut waiting = editor(None);
        assert!(!waiting.collect_replies());
    }

    #[test]
    fn failed_gateway_detection_is_shown_to_the_user() {
        let mut draft = Settings::default();
        let mut errors = Vec::new();
        apply_detected_gateway(&mut draft, Err("Failed to get default gateway: no route".into()), &mut errors);
        assert_eq!(errors, vec!["Failed to get default gateway: no route".to_string()]);
        assert!(draft.server_settings.gateway_ip.is_empty());

        apply_detected_gateway(
            &mut draft,
            Ok(("192.168.1.1".into(), "aa:bb:cc:dd:ee:ff".into())),
            &mut errors,
        );
        assert_eq!(draft.server_settings.gateway_ip, "192.168.1.1");
        assert_eq!(draft.server_settings.gateway_mac, "aa:bb:cc:dd:ee:ff");
    }
}
