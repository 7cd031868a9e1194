use crate::models::{HistoryPoint, UptimePoint};
use crate::period::{format_date, format_interval, PeriodWindow, SelectablePeriod, TimePeriod};
use chrono::{DateTime, Local};
use eframe::egui;

const CHART_HEIGHT: f32 = 160.0;
const AXIS_HEIGHT: f32 = 16.0;
const BAR_GAP: f32 = 2.0;

pub struct Bar {
    pub start: DateTime<Local>,
    /// `None` draws an empty slot.
    pub value: Option<f64>,
    pub tooltip: String,
}

pub fn history_bars(points: &[HistoryPoint], interval: TimePeriod) -> Vec<Bar> {
    points
        .iter()
        .map(|point| {
            let start = point.time.with_timezone(&Local);
            let tooltip = match point.average {
                Some(average) => format!("{}: {:.1} devices online", format_date(interval, &start), average),
                None => format!("{}: no data", format_date(interval, &start)),
            };
            Bar {
                start,
                value: point.average,
                tooltip,
            }
        })
        .collect()
}

pub fn uptime_bars(points: &[UptimePoint], interval: TimePeriod) -> Vec<Bar> {
    points
        .iter()
        .map(|point| {
            let start = point.time.with_timezone(&Local);
            let online = format_interval(interval, point.uptime)
                .unwrap_or_else(|_| format!("{} s", point.uptime));
            Bar {
                start,
                value: Some(point.uptime as f64),
                tooltip: format!("{}: online {}", format_date(interval, &start), online),
            }
        })
        .collect()
}

/// Index of the bar under `x` when `count` bars share `[left, left + width)`.
fn bar_index(left: f32, width: f32, count: usize, x: f32) -> Option<usize> {
    if count == 0 || width <= 0.0 || x < left || x >= left + width {
        return None;
    }
    let index = ((x - left) / width * count as f32) as usize;
    Some(index.min(count - 1))
}

/// Draws `bars` scaled to `max` and returns the start of a clicked bar.
pub fn bar_chart(
    ui: &mut egui::Ui,
    id: &str,
    bars: &[Bar],
    max: f64,
    interval: TimePeriod,
) -> Option<DateTime<Local>> {
    let width = ui.available_width();
    let (rect, response) = ui.allocate_exact_size(
        egui::vec2(width, CHART_HEIGHT + AXIS_HEIGHT),
        egui::Sense::click(),
    );
    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, 4.0, egui::Color32::from_rgb(248, 248, 248));

    if bars.is_empty() {
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            "No data for this period",
            egui::FontId::proportional(13.0),
            egui::Color32::from_rgb(130, 130, 130),
        );
        return None;
    }

    let plot = egui::Rect::from_min_size(rect.min, egui::vec2(width, CHART_HEIGHT));
    let slot = plot.width() / bars.len() as f32;
    let hovered = response
        .hover_pos()
        .and_then(|pos| bar_index(plot.left(), plot.width(), bars.len(), pos.x));
    let label_every = (bars.len() / 12).max(1);

    for (index, bar) in bars.iter().enumerate() {
        let left = plot.left() + slot * index as f32;
        if let Some(value) = bar.value {
            let share = if max > 0.0 { (value / max).clamp(0.0, 1.0) } else { 0.0 };
            let top = plot.bottom() - plot.height() * share as f32;
            let color = if hovered == Some(index) {
                egui::Color32::from_rgb(0, 90, 170)
            } else {
                egui::Color32::from_rgb(0, 120, 215)
            };
            painter.rect_filled(
                egui::Rect::from_min_max(
                    egui::pos2(left + BAR_GAP / 2.0, top),
                    egui::pos2(left + slot - BAR_GAP / 2.0, plot.bottom()),
                ),
                1.0,
                color,
            );
        }
        if index % label_every == 0 {
            painter.text(
                egui::pos2(left + slot / 2.0, plot.bottom() + 2.0),
                egui::Align2::CENTER_TOP,
                format_date(interval, &bar.start),
                egui::FontId::proportional(10.0),
                egui::Color32::from_rgb(100, 100, 100),
            );
        }
    }

    let index = hovered?;
    let bar = &bars[index];
    egui::show_tooltip_at_pointer(ui.ctx(), egui::Id::new(id).with("tooltip"), |ui| {
        ui.label(&bar.tooltip);
    });
    response.clicked().then(|| bar.start)
}

/// Period dropdown with previous/next buttons. Returns whether the window
/// changed.
pub fn period_controls(ui: &mut egui::Ui, id: &str, window: &mut PeriodWindow<Local>) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        let mut selected = window.period;
        egui::ComboBox::from_id_source(id)
            .selected_text(selected.label())
            .show_ui(ui, |ui| {
                for option in SelectablePeriod::CHART_OPTIONS {
                    ui.selectable_value(&mut selected, option, option.label());
                }
            });
        if selected != window.period {
            window.select(selected, &Local::now());
            changed = true;
        }

        if ui.button("◀").clicked() {
            window.step_backward();
            changed = true;
        }
        ui.label(
            egui::RichText::new(format_date(window.period.as_period(), &window.start)).strong(),
        );
        if ui.button("▶").clicked() {
            window.step_forward();
            changed = true;
        }
    });
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn pointer_maps_to_bar() {
        assert_eq!(bar_index(10.0, 100.0, 4, 10.0), Some(0));
        assert_eq!(bar_index(10.0, 100.0, 4, 59.0), Some(1));
        assert_eq!(bar_index(10.0, 100.0, 4, 109.9), Some(3));
        assert_eq!(bar_index(10.0, 100.0, 4, 110.0), None);
        assert_eq!(bar_index(10.0, 100.0, 0, 50.0), None);
    }

    #[test]
    fn uptime_tooltip_uses_interval_breakdown() {
        let points = [UptimePoint {
            time: Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0).unwrap(),
            uptime: 2700,
        }];
        let bars = uptime_bars(&points, TimePeriod::Hour);
        assert_eq!(bars[0].value, Some(2700.0));
        assert!(bars[0].tooltip.ends_with("online 45 min"), "{}", bars[0].tooltip);
    }

    #[test]
    fn missing_history_average_is_an_empty_slot() {
        let points = [HistoryPoint {
            time: Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0).unwrap(),
            average: None,
        }];
        let bars = history_bars(&points, TimePeriod::Hour);
        assert_eq!(bars[0].value, None);
        assert!(bars[0].tooltip.ends_with("no data"));
    }
}
