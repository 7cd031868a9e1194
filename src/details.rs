use crate::chart::{bar_chart, period_controls, uptime_bars};
use crate::models::{last_seen_label, Device, DeviceStatus};
use crate::period::{PeriodWindow, SelectablePeriod, Series};
use crate::spoof::{action_state, SpoofAction};
use crate::store::{lock, DashboardStore};
use chrono::{Local, Utc, Weekday};
use eframe::egui;

/// Details window for one device: network info, open ports, uptime chart
/// and spoof actions.
pub struct DeviceDetails {
    mac: String,
    window: PeriodWindow<Local>,
}

impl DeviceDetails {
    pub fn new(mac: &str, week_start: Weekday) -> Self {
        Self {
            mac: mac.to_string(),
            window: PeriodWindow::starting_now(
                Series::Uptime,
                SelectablePeriod::Day,
                &Local::now(),
                week_start,
            ),
        }
    }

    /// Returns `false` once the user closed the window.
    pub fn show(&mut self, ctx: &egui::Context, store: &mut DashboardStore) -> bool {
        let device = lock(&store.state.devices)
            .iter()
            .find(|device| device.mac == self.mac)
            .cloned();
        let Some(device) = device else {
            store.stop_uptime();
            return false;
        };
        store.watch_uptime(&self.mac, &self.window);

        let mut open = true;
        egui::Window::new(format!("{} {}", device.glyph(), device.display_name()))
            .id(egui::Id::new("device_details").with(&self.mac))
            .open(&mut open)
            .default_width(520.0)
            .show(ctx, |ui| {
                self.render_network(ui, &device);
                ui.add_space(10.0);
                self.render_ports(ui, &device);
                ui.add_space(10.0);
                self.render_uptime(ui, store);
                ui.add_space(10.0);
                render_spoof_actions(ui, store, &device);
            });

        if !open {
            store.stop_uptime();
        }
        open
    }

    fn render_network(&self, ui: &mut egui::Ui, device: &Device) {
        let now = Utc::now();
        ui.label(egui::RichText::new("🌐 Network").strong());
        egui::Grid::new(("device_network", &self.mac))
            .num_columns(2)
            .spacing([20.0, 4.0])
            .show(ui, |ui| {
                let status = device.status(now);
                let status_color = match status {
                    DeviceStatus::Online => egui::Color32::from_rgb(50, 150, 50),
                    DeviceStatus::Offline => egui::Color32::from_rgb(100, 100, 100),
                };
                ui.label("Status");
                ui.colored_label(status_color, status.as_str());
                ui.end_row();

                for (label, value) in [
                    ("IP address", &device.ip),
                    ("MAC address", &device.mac),
                    ("Hostname", &device.hostname),
                    ("Vendor", &device.vendor),
                    ("Type", &device.kind),
                ] {
                    ui.label(label);
                    ui.label(if value.is_empty() { "-" } else { value.as_str() });
                    ui.end_row();
                }

                ui.label("Last seen");
                ui.label(last_seen_label(device.last_online, &Local::now()));
                ui.end_row();
            });
    }

    fn render_ports(&self, ui: &mut egui::Ui, device: &Device) {
        ui.label(
            egui::RichText::new(format!("🔌 Open ports ({})", device.open_ports.len())).strong(),
        );
        if device.open_ports.is_empty() {
            ui.label("No open ports found");
            return;
        }
        egui::ScrollArea::vertical()
            .id_source(("ports", &self.mac))
            .max_height(100.0)
            .show(ui, |ui| {
                for port in &device.open_ports {
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(port.port.to_string()).monospace());
                        ui.label(&port.service);
                    });
                }
            });
    }

    fn render_uptime(&mut self, ui: &mut egui::Ui, store: &mut DashboardStore) {
        ui.label(egui::RichText::new("📈 Uptime").strong());
        if period_controls(ui, &format!("uptime_period_{}", self.mac), &mut self.window) {
            store.watch_uptime(&self.mac, &self.window);
        }

        let interval = self.window.interval;
        let bars = store
            .state
            .uptime
            .get(&self.mac)
            .map(|points| uptime_bars(points.value(), interval))
            .unwrap_or_default();
        let id = format!("uptime_chart_{}", self.mac);
        if let Some(bucket) = bar_chart(ui, &id, &bars, interval.seconds() as f64, interval) {
            if self.window.drill_down(bucket) {
                store.watch_uptime(&self.mac, &self.window);
            }
        }
    }
}

fn render_spoof_actions(ui: &mut egui::Ui, store: &DashboardStore, device: &Device) {
    let current = lock(&store.state.spoofed).clone();
    ui.label(egui::RichText::new("🛡 Spoofing").strong());
    ui.horizontal(|ui| {
        for action in [SpoofAction::Block, SpoofAction::Redirect] {
            let state = action_state(device, &current, action);
            let fill = match (action, state.active) {
                (SpoofAction::Block, true) => egui::Color32::from_rgb(200, 50, 50),
                (SpoofAction::Redirect, true) => egui::Color32::from_rgb(0, 120, 215),
                (_, false) => egui::Color32::from_rgb(230, 230, 230),
            };
            let text_color = if state.active {
                egui::Color32::WHITE
            } else {
                egui::Color32::BLACK
            };
            let button = egui::Button::new(egui::RichText::new(action.label()).color(text_color))
                .fill(fill);
            if ui
                .add_enabled(!state.disabled, button)
                .on_disabled_hover_text("Another device is being spoofed")
                .clicked()
            {
                store.toggle_spoof(device, action);
            }
        }
    });
}
