//! The eframe/egui live chart window.
//!
//! Owns a [`ChartContext`] and re-reads the store on a fixed interval. The
//! window only reads the store file; it shares nothing else with ingestion.
use crate::chart::{ChartContext, Panel};
use crate::store::ReadingStore;
use eframe::egui;
use egui::Color32;
use egui_plot::{HLine, Legend, Line, LineStyle, Plot, PlotPoints};
use std::time::{Duration, Instant};

/// Live chart application.
pub struct LiveChartApp {
    store: ReadingStore,
    chart: ChartContext,
    refresh_interval: Duration,
    last_refresh: Option<Instant>,
    last_error: Option<String>,
}

impl LiveChartApp {
    /// Creates the app; the first frame triggers the first refresh.
    pub fn new(store: ReadingStore, refresh_interval: Duration) -> Self {
        Self {
            store,
            chart: ChartContext::new(),
            refresh_interval,
            last_refresh: None,
            last_error: None,
        }
    }

    fn refresh_if_due(&mut self) {
        let due = self
            .last_refresh
            .map_or(true, |at| at.elapsed() >= self.refresh_interval);
        if due {
            self.last_error = self.chart.refresh(&self.store).err().map(|e| e.to_string());
            self.last_refresh = Some(Instant::now());
        }
    }
}

impl eframe::App for LiveChartApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.refresh_if_due();

        egui::TopBottomPanel::top("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Sensor Monitor");
                ui.separator();
                ui.label(format!("{} readings", self.chart.samples));
                if let Some(origin) = self.chart.origin {
                    ui.separator();
                    ui.label(format!("since {}", origin));
                }
                if let Some(error) = &self.last_error {
                    ui.separator();
                    ui.colored_label(Color32::from_rgb(255, 100, 100), error);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let height = (ui.available_height() / 2.0 - 24.0).max(120.0);
            draw_panel(ui, &self.chart.temperature, height, Color32::RED);
            draw_panel(ui, &self.chart.humidity, height, Color32::from_rgb(255, 165, 0));
        });

        ctx.request_repaint_after(self.refresh_interval);
    }
}

fn draw_panel(ui: &mut egui::Ui, panel: &Panel, height: f32, guide_color: Color32) {
    ui.heading(panel.title);
    Plot::new(panel.title)
        .legend(Legend::default())
        .height(height)
        .x_axis_label("Time (s)")
        .y_axis_label(panel.y_label)
        .show(ui, |plot_ui| {
            for (node, points) in &panel.series {
                plot_ui.line(Line::new(PlotPoints::from(points.clone())).name(node));
            }
            for guide in &panel.guides {
                plot_ui.hline(
                    HLine::new(guide.value)
                        .name(guide.label)
                        .color(guide_color)
                        .style(LineStyle::dashed_loose()),
                );
            }
        });
}

/// Open the window and block until it is closed.
pub fn run(store: ReadingStore, refresh_interval: Duration) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Sensor Monitor",
        options,
        Box::new(move |_cc| Ok(Box::new(LiveChartApp::new(store, refresh_interval)))),
    )
}
