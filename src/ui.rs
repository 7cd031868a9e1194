use crate::chart::{bar_chart, history_bars, period_controls};
use crate::details::DeviceDetails;
use crate::editors::{KnownDevicesEditor, SettingsEditor};
use crate::login::LoginWindow;
use crate::models::{device_glyph, last_seen_label, Device, DeviceStatus};
use crate::period::{PeriodWindow, SelectablePeriod, Series};
use crate::store::{lock, DashboardStore, Pending};
use crate::summary::{filter_devices, type_breakdown, ScanProgress};
use crate::toast::ToastLevel;
use chrono::{Local, Utc, Weekday};
use eframe::egui;
use std::time::{Duration, Instant};
use tracing::info;

const BOX_FILL: egui::Color32 = egui::Color32::from_rgb(240, 240, 240);
const BOX_STROKE: egui::Color32 = egui::Color32::from_rgb(200, 200, 200);
const VALUE_COLOR: egui::Color32 = egui::Color32::from_rgb(50, 50, 50);
const ONLINE_COLOR: egui::Color32 = egui::Color32::from_rgb(50, 150, 50);
const OFFLINE_COLOR: egui::Color32 = egui::Color32::from_rgb(100, 100, 100);

fn info_box<R>(ui: &mut egui::Ui, width: f32, add_contents: impl FnOnce(&mut egui::Ui) -> R) -> R {
    egui::Frame::none()
        .fill(BOX_FILL)
        .stroke(egui::Stroke::new(1.0, BOX_STROKE))
        .inner_margin(15.0)
        .show(ui, |ui| {
            ui.set_width(width);
            ui.vertical(add_contents).inner
        })
        .inner
}

pub struct DashboardApp {
    store: DashboardStore,
    week_start: Weekday,
    login: LoginWindow,
    token_check: Option<Pending<bool>>,
    search: String,
    history_window: PeriodWindow<Local>,
    details: Option<DeviceDetails>,
    settings: Option<SettingsEditor>,
    known_devices: Option<KnownDevicesEditor>,
}

impl DashboardApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, store: DashboardStore, week_start: Weekday) -> Self {
        let token_check = store.is_authenticated().then(|| store.check_token());
        Self {
            store,
            week_start,
            login: LoginWindow::new(),
            token_check,
            search: String::new(),
            history_window: PeriodWindow::starting_now(
                Series::History,
                SelectablePeriod::Day,
                &Local::now(),
                week_start,
            ),
            details: None,
            settings: None,
            known_devices: None,
        }
    }

    fn sign_out(&mut self) {
        self.details = None;
        self.settings = None;
        self.known_devices = None;
        self.token_check = None;
        self.store.sign_out();
    }

    fn check_session(&mut self) {
        if let Some(reply) = self.token_check.as_ref().and_then(Pending::take) {
            self.token_check = None;
            if let Ok(false) = reply {
                info!("Stored token was rejected");
                self.sign_out();
                self.store.state.toasts.info("Please sign in again");
                return;
            }
        }
        if self.store.take_signed_out() && self.store.is_authenticated() {
            self.sign_out();
            self.store.state.toasts.info("Your session has expired");
        }
    }

    fn render_header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(10.0);
            ui.heading("🖧 LAN Monitor");
            ui.add_space(20.0);
            ui.label("Devices seen by the network scanner");

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.add_space(10.0);
                if ui.button("⎋ Sign out").clicked() {
                    self.sign_out();
                }
                if ui.button("⚙ Settings").clicked() && self.settings.is_none() {
                    self.settings = Some(SettingsEditor::open(&self.store));
                }
                if self.store.state.loading.is_loading() {
                    ui.spinner();
                }
            });
        });

        ui.add_space(5.0);
        ui.separator();
    }

    fn render_info_panel(&mut self, ui: &mut egui::Ui, devices: &[Device]) {
        let now = Utc::now();
        let online = devices.iter().filter(|device| device.is_online(now)).count();
        let known = *lock(&self.store.state.known_count);
        let scan = *lock(&self.store.state.scan);

        ui.horizontal(|ui| {
            ui.add_space(5.0);

            info_box(ui, 220.0, |ui| {
                ui.label(egui::RichText::new("📊 Online Devices").strong());
                ui.label(
                    egui::RichText::new(format!("{online} / {}", devices.len()))
                        .size(16.0)
                        .color(VALUE_COLOR),
                );
            });

            ui.add_space(5.0);

            info_box(ui, 260.0, |ui| {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new("📋 Known Devices").strong());
                    if ui.small_button("Edit").clicked() && self.known_devices.is_none() {
                        self.known_devices = Some(KnownDevicesEditor::open(&self.store));
                    }
                });
                let text = match known {
                    Some(count) => format!("{count} / {}", devices.len()),
                    None => "-".to_string(),
                };
                ui.label(egui::RichText::new(text).size(16.0).color(VALUE_COLOR));
            });

            ui.add_space(5.0);

            info_box(ui, 400.0, |ui| {
                ui.label(egui::RichText::new("🔍 Scanner").strong());
                match (scan.last_scan, scan.interval) {
                    (Some(last_scan), Some(interval)) => {
                        let progress = ScanProgress::new(last_scan, interval, now);
                        ui.add(egui::ProgressBar::new(progress.fraction).desired_width(380.0));
                        ui.label(egui::RichText::new(progress.label(now)).color(VALUE_COLOR));
                    }
                    _ => {
                        ui.label(egui::RichText::new("Waiting for scan results").color(VALUE_COLOR));
                    }
                }
            });
        });
    }

    fn render_history(&mut self, ui: &mut egui::Ui, total_devices: usize) {
        ui.label(egui::RichText::new("📈 Online history").size(16.0).strong());
        if period_controls(ui, "history_period", &mut self.history_window) {
            self.store.watch_history(&self.history_window);
        }
        let interval = self.history_window.interval;
        let bars = history_bars(&lock(&self.store.state.history), interval);
        let peak = bars
            .iter()
            .filter_map(|bar| bar.value)
            .fold(total_devices as f64, f64::max);
        if let Some(bucket) = bar_chart(ui, "history_chart", &bars, peak, interval) {
            if self.history_window.drill_down(bucket) {
                self.store.watch_history(&self.history_window);
            }
        }
    }

    fn render_device_types(&self, ui: &mut egui::Ui, devices: &[Device]) {
        let now = Utc::now();
        let breakdown = type_breakdown(devices.iter().filter(|device| device.is_online(now)));
        let total: usize = breakdown.iter().map(|entry| entry.count).sum();

        ui.label(egui::RichText::new("🗂 Device types").size(16.0).strong());
        if total == 0 {
            ui.label("No devices online");
            return;
        }
        egui::Grid::new("device_types")
            .num_columns(3)
            .spacing([10.0, 4.0])
            .show(ui, |ui| {
                for entry in &breakdown {
                    ui.label(format!("{} {}", device_glyph(&entry.kind), entry.kind));
                    ui.add(
                        egui::ProgressBar::new(entry.count as f32 / total as f32)
                            .desired_width(160.0),
                    );
                    ui.label(entry.count.to_string());
                    ui.end_row();
                }
            });
    }

    fn render_device_table(&mut self, ui: &mut egui::Ui, devices: &[Device]) {
        let shown = filter_devices(devices, &self.search);

        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new(format!("Network Devices ({})", shown.len()))
                    .size(16.0)
                    .strong(),
            );
            ui.add_space(20.0);
            ui.add(
                egui::TextEdit::singleline(&mut self.search)
                    .hint_text("🔎 Search name, IP, MAC, vendor...")
                    .desired_width(260.0),
            );
        });

        ui.add_space(5.0);

        egui::Frame::none()
            .fill(egui::Color32::from_rgb(245, 245, 245))
            .show(ui, |ui| {
                egui::Grid::new("device_header")
                    .num_columns(6)
                    .min_col_width(120.0)
                    .show(ui, |ui| {
                        for title in ["Name", "IP Address", "MAC Address", "Vendor", "Status", "Last seen"] {
                            ui.label(egui::RichText::new(title).strong().size(12.0));
                        }
                        ui.end_row();
                    });
            });

        ui.separator();

        let now = Utc::now();
        let local_now = Local::now();
        egui::ScrollArea::vertical()
            .max_height(320.0)
            .show(ui, |ui| {
                egui::Grid::new("device_rows")
                    .num_columns(6)
                    .min_col_width(120.0)
                    .striped(true)
                    .show(ui, |ui| {
                        for device in shown {
                            let name = format!("{} {}", device.glyph(), device.display_name());
                            if ui.link(egui::RichText::new(name).size(12.0)).clicked() {
                                self.details = Some(DeviceDetails::new(&device.mac, self.week_start));
                            }
                            ui.label(egui::RichText::new(&device.ip).size(12.0));
                            ui.label(egui::RichText::new(&device.mac).size(12.0));
                            ui.label(egui::RichText::new(&device.vendor).size(12.0));

                            let status = device.status(now);
                            let status_color = match status {
                                DeviceStatus::Online => ONLINE_COLOR,
                                DeviceStatus::Offline => OFFLINE_COLOR,
                            };
                            ui.colored_label(status_color, status.as_str());
                            ui.label(
                                egui::RichText::new(last_seen_label(device.last_online, &local_now))
                                    .size(12.0),
                            );
                            ui.end_row();
                        }
                    });
            });
    }

    fn render_toasts(&self, ctx: &egui::Context) {
        let toasts = self.store.state.toasts.visible(Instant::now());
        if toasts.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("toasts"))
            .anchor(egui::Align2::RIGHT_BOTTOM, [-10.0, -10.0])
            .show(ctx, |ui| {
                for toast in toasts {
                    let fill = match toast.level {
                        ToastLevel::Info => egui::Color32::from_rgb(0, 120, 215),
                        ToastLevel::Success => egui::Color32::from_rgb(50, 150, 50),
                        ToastLevel::Error => egui::Color32::from_rgb(200, 50, 50),
                    };
                    egui::Frame::none()
                        .fill(fill)
                        .rounding(4.0)
                        .inner_margin(10.0)
                        .show(ui, |ui| {
                            ui.label(egui::RichText::new(toast.message).color(egui::Color32::WHITE));
                        });
                    ui.add_space(4.0);
                }
            });
    }

    fn render_windows(&mut self, ctx: &egui::Context) {
        if let Some(details) = self.details.as_mut() {
            if !details.show(ctx, &mut self.store) {
                self.details = None;
            }
        }
        if let Some(settings) = self.settings.as_mut() {
            if !settings.show(ctx, &mut self.store) {
                self.settings = None;
            }
        }
        if let Some(editor) = self.known_devices.as_mut() {
            if !editor.show(ctx, &self.store) {
                self.known_devices = None;
            }
        }
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_session();

        if !self.store.is_authenticated() {
            egui::CentralPanel::default().show(ctx, |_| {});
            if let Some(token) = self.login.show(ctx, &self.store) {
                self.store.sign_in(token);
            }
        } else {
            self.store.sync();
            self.store.watch_history(&self.history_window);
            let devices = lock(&self.store.state.devices).clone();

            egui::CentralPanel::default().show(ctx, |ui| {
                ui.add_space(10.0);

                self.render_header(ui);
                ui.add_space(15.0);

                self.render_info_panel(ui, &devices);
                ui.add_space(15.0);

                egui::ScrollArea::vertical().id_source("dashboard").show(ui, |ui| {
                    ui.columns(2, |columns| {
                        self.render_history(&mut columns[0], devices.len());
                        self.render_device_types(&mut columns[1], &devices);
                    });
                    ui.add_space(15.0);
                    ui.separator();
                    ui.add_space(10.0);

                    self.render_device_table(ui, &devices);
                });
            });

            self.render_windows(ctx);
        }

        self.render_toasts(ctx);
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}
