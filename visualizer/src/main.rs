use echocore::messages::DisplayModel;
use echocore::params::ParamSnapshot;
use echocore::ControlRequest;
use iced::{
    mouse, time,
    widget::{
        button,
        canvas::{self, Canvas, Frame, Geometry, Path, Stroke},
        column, row, scrollable, text, text_input, Column, Container,
    },
    Alignment, Color, Element, Length, Point, Rectangle, Renderer, Subscription, Task, Theme,
};
use std::time::Duration;

const BRIDGE: &str = "http://127.0.0.1:9000";

fn main() -> iced::Result {
    iced::application(Visualizer::boot, Visualizer::update, Visualizer::view)
        .title(application_title)
        .subscription(application_subscription)
        .theme(application_theme)
        .run()
}

fn application_title(_: &Visualizer) -> String {
    "Echo Ranging Display".into()
}

fn application_subscription(_: &Visualizer) -> Subscription<Message> {
    time::every(Duration::from_millis(500)).map(|_| Message::Tick)
}

fn application_theme(_: &Visualizer) -> Theme {
    Theme::Dark
}

#[derive(Debug)]
struct Visualizer {
    controls: ControlForm,
    model: Option<DisplayModel>,
    params: Option<ParamSnapshot>,
    status: String,
    activity: Vec<String>,
}

#[derive(Debug, Clone)]
enum Message {
    Tick,
    HistoryFetched(Result<DisplayModel, String>),
    ParamsFetched(Result<ParamSnapshot, String>),
    ControlChanged(ControlField, String),
    Apply(ControlField),
    Applied(Result<ParamSnapshot, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlField {
    GainTx,
    GainRx,
    DelaySamp,
    DecimFac,
    Threshold,
    GuardBins,
    Amplitude,
    CenterFreq,
}

impl ControlField {
    const ALL: [ControlField; 8] = [
        ControlField::GainTx,
        ControlField::GainRx,
        ControlField::DelaySamp,
        ControlField::DecimFac,
        ControlField::Threshold,
        ControlField::GuardBins,
        ControlField::Amplitude,
        ControlField::CenterFreq,
    ];

    fn label(self) -> &'static str {
        match self {
            ControlField::GainTx => "TX gain (dB)",
            ControlField::GainRx => "RX gain (dB)",
            ControlField::DelaySamp => "Delay (samples)",
            ControlField::DecimFac => "Decimation",
            ControlField::Threshold => "Peak threshold",
            ControlField::GuardBins => "Guard bins",
            ControlField::Amplitude => "Amplitude",
            ControlField::CenterFreq => "Center frequency (Hz)",
        }
    }

    fn current(self, snapshot: &ParamSnapshot) -> String {
        let config = &snapshot.config;
        match self {
            ControlField::GainTx => config.gain_tx.to_string(),
            ControlField::GainRx => config.gain_rx.to_string(),
            ControlField::DelaySamp => config.delay_samp.to_string(),
            ControlField::DecimFac => config.decim_fac.to_string(),
            ControlField::Threshold => config.threshold.to_string(),
            ControlField::GuardBins => config.guard_bins.to_string(),
            ControlField::Amplitude => config.amplitude.to_string(),
            ControlField::CenterFreq => config.center_freq.to_string(),
        }
    }

    fn request(self, value: &str) -> Result<ControlRequest, String> {
        let value = value.trim();
        let invalid = || format!("{} is not a valid {}", value, self.label());
        let float = || value.parse::<f64>().map_err(|_| invalid());
        let single = || value.parse::<f32>().map_err(|_| invalid());
        let count = || value.parse::<usize>().map_err(|_| invalid());
        Ok(match self {
            ControlField::GainTx => ControlRequest::GainTx(float()?),
            ControlField::GainRx => ControlRequest::GainRx(float()?),
            ControlField::DelaySamp => ControlRequest::DelaySamp(count()?),
            ControlField::DecimFac => ControlRequest::DecimFac(float()?),
            ControlField::Threshold => ControlRequest::Threshold(single()?),
            ControlField::GuardBins => ControlRequest::GuardBins(count()?),
            ControlField::Amplitude => ControlRequest::Amplitude(single()?),
            ControlField::CenterFreq => ControlRequest::CenterFreq(float()?),
        })
    }
}

#[derive(Debug, Clone, Default)]
struct ControlForm {
    values: [String; 8],
}

impl ControlForm {
    fn index(field: ControlField) -> usize {
        ControlField::ALL
            .iter()
            .position(|candidate| *candidate == field)
            .unwrap_or(0)
    }

    fn get(&self, field: ControlField) -> &str {
        &self.values[Self::index(field)]
    }

    fn set(&mut self, field: ControlField, value: String) {
        self.values[Self::index(field)] = value;
    }

    fn load(&mut self, snapshot: &ParamSnapshot) {
        for field in ControlField::ALL {
            self.set(field, field.current(snapshot));
        }
    }
}

impl Visualizer {
    fn boot() -> (Self, Task<Message>) {
        (
            Visualizer {
                controls: ControlForm::default(),
                model: None,
                params: None,
                status: "Waiting for the bridge...".into(),
                activity: Vec::new(),
            },
            Task::batch([
                Task::perform(fetch_history(), Message::HistoryFetched),
                Task::perform(fetch_params(), Message::ParamsFetched),
            ]),
        )
    }

    fn update(state: &mut Self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => {
                let history = Task::perform(fetch_history(), Message::HistoryFetched);
                if state.params.is_none() {
                    Task::batch([history, Task::perform(fetch_params(), Message::ParamsFetched)])
                } else {
                    history
                }
            }
            Message::HistoryFetched(Ok(model)) => {
                state.status = match model.latest() {
                    Some(latest) => format!(
                        "Cycle {}: {} estimates in the last {:.0} s",
                        latest.seq,
                        model.estimates.len(),
                        model.range_time
                    ),
                    None => "Bridge up, no estimates yet".into(),
                };
                state.model = Some(model);
                Task::none()
            }
            Message::HistoryFetched(Err(err)) => {
                state.status = format!("History error: {err}");
                Task::none()
            }
            Message::ParamsFetched(Ok(snapshot)) => {
                state.controls.load(&snapshot);
                state.params = Some(snapshot);
                Task::none()
            }
            Message::ParamsFetched(Err(err)) => {
                state.status = format!("Parameter error: {err}");
                Task::none()
            }
            Message::ControlChanged(field, value) => {
                state.controls.set(field, value);
                Task::none()
            }
            Message::Apply(field) => match field.request(state.controls.get(field)) {
                Ok(request) => {
                    let entry = format!("{} -> {}", field.label(), state.controls.get(field));
                    state.push_activity(entry);
                    Task::perform(post_control(request), Message::Applied)
                }
                Err(err) => {
                    state.status = err;
                    Task::none()
                }
            },
            Message::Applied(Ok(snapshot)) => {
                state.status = format!("Parameters now at version {}", snapshot.version);
                state.controls.load(&snapshot);
                state.params = Some(snapshot);
                Task::none()
            }
            Message::Applied(Err(err)) => {
                state.status = format!("Rejected: {err}");
                state.push_activity(format!("rejected: {err}"));
                Task::none()
            }
        }
    }

    fn view(state: &Self) -> Element<'_, Message> {
        let controls = ControlField::ALL.iter().fold(
            Column::new().spacing(8),
            |col, &field| {
                col.push(
                    row![
                        text_input(field.label(), state.controls.get(field))
                            .on_input(move |value| Message::ControlChanged(field, value))
                            .on_submit(Message::Apply(field))
                            .padding(6),
                        button("Set").on_press(Message::Apply(field)).padding(6),
                    ]
                    .spacing(6)
                    .align_y(Alignment::Center),
                )
            },
        );

        let resolution = match &state.params {
            Some(snapshot) => column![
                text(format!("Range resolution: {:.2} m", snapshot.derived.range_res)).size(12),
                text(format!("Velocity resolution: {:.4} m/s", snapshot.derived.v_res)).size(12),
                text(format!("Cycle time: {:.3} s", snapshot.derived.time_res)).size(12),
                text(format!(
                    "Spectrum: {} bins at {:.1} Hz",
                    snapshot.derived.fft_len, snapshot.derived.decimated_rate
                ))
                .size(12),
            ]
            .spacing(4),
            None => column![text("Parameters unavailable").size(12)],
        };

        let control_column = column![
            text("Controls").size(26),
            controls,
            text(&state.status).size(14),
            text("Derived").size(16),
            resolution,
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fixed(360.0));

        let estimates = state
            .model
            .as_ref()
            .map(|model| model.estimates.as_slice())
            .unwrap_or_default();
        let range_points: Vec<(f64, f64)> = estimates
            .iter()
            .map(|estimate| (estimate.timestamp, estimate.range))
            .collect();
        let velocity_points: Vec<(f64, f64)> = estimates
            .iter()
            .filter_map(|estimate| estimate.velocity.map(|v| (estimate.timestamp, v)))
            .collect();

        let latest = match state.model.as_ref().and_then(|model| model.latest()) {
            Some(estimate) => text(format!(
                "Range {:.2} m (±{:.2})   Velocity {}   |peak| {:.1}",
                estimate.range,
                estimate.range_res / 2.0,
                estimate
                    .velocity
                    .map_or_else(|| "off".to_string(), |v| format!("{v:.3} m/s")),
                estimate.magnitude
            ))
            .size(18),
            None => text("No estimate yet").size(18),
        };

        let metrics = match &state.model {
            Some(model) => text(format!(
                "received {}   frames {}   detections {}   dropped {}   errors {}",
                model.received,
                model.metrics.processed,
                model.metrics.detections,
                model.metrics.dropped_messages,
                model.metrics.errors
            ))
            .size(12),
            None => text("").size(12),
        };

        let range_plot = Canvas::new(HistoryPlot {
            points: range_points,
            color: Color::from_rgb(0.18, 0.72, 0.89),
        })
        .width(Length::Fill)
        .height(Length::Fixed(220.0));

        let velocity_plot = Canvas::new(HistoryPlot {
            points: velocity_points,
            color: Color::from_rgb(0.95, 0.55, 0.2),
        })
        .width(Length::Fill)
        .height(Length::Fixed(220.0));

        let activity = if state.activity.is_empty() {
            Column::new().push(text("No changes yet").size(12))
        } else {
            state
                .activity
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, entry| {
                    col.push(text(entry.clone()).size(12))
                })
        };

        let display_column = column![
            text("Target").size(26),
            latest,
            metrics,
            text("Range (m) over time").size(16),
            range_plot,
            text("Velocity (m/s) over time").size(16),
            velocity_plot,
            text("Control log").size(16),
            Container::new(scrollable(activity).height(Length::Fixed(90.0))).padding(6),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fill);

        let layout = row![control_column, display_column]
            .spacing(20)
            .align_y(Alignment::Start)
            .padding(20);

        Container::new(layout)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    fn push_activity(&mut self, entry: String) {
        self.activity.push(entry);
        if self.activity.len() > 20 {
            self.activity.remove(0);
        }
    }
}

async fn fetch_history() -> Result<DisplayModel, String> {
    let response = reqwest::get(format!("{BRIDGE}/history"))
        .await
        .map_err(|e| e.to_string())?;
    response
        .json::<DisplayModel>()
        .await
        .map_err(|e| e.to_string())
}

async fn fetch_params() -> Result<ParamSnapshot, String> {
    let response = reqwest::get(format!("{BRIDGE}/params"))
        .await
        .map_err(|e| e.to_string())?;
    response
        .json::<ParamSnapshot>()
        .await
        .map_err(|e| e.to_string())
}

async fn post_control(request: ControlRequest) -> Result<ParamSnapshot, String> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{BRIDGE}/control"))
        .json(&request)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        response
            .json::<ParamSnapshot>()
            .await
            .map_err(|e| e.to_string())
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);
        Err(format!("{status}: {reason}"))
    }
}

/// Line plot of `(time, value)` pairs scaled to the canvas.
#[derive(Clone)]
struct HistoryPlot {
    points: Vec<(f64, f64)>,
    color: Color,
}

impl canvas::Program<Message> for HistoryPlot {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(
            Point::ORIGIN,
            bounds.size(),
            Color::from_rgb(0.05, 0.05, 0.05),
        );

        let axis = Path::new(|builder| {
            builder.move_to(Point::new(0.0, bounds.height / 2.0));
            builder.line_to(Point::new(bounds.width, bounds.height / 2.0));
        });
        frame.stroke(
            &axis,
            Stroke::default()
                .with_color(Color::from_rgb(0.25, 0.25, 0.3))
                .with_width(1.0),
        );

        if let (Some(first), Some(last)) = (self.points.first(), self.points.last()) {
            let t0 = first.0;
            let span = (last.0 - t0).max(f64::EPSILON);
            let min = self.points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
            let max = self.points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
            let mid = (max + min) / 2.0;
            let half = ((max - min) / 2.0).max(1e-3) * 1.1;

            let to_point = |(t, value): (f64, f64)| {
                let x = if self.points.len() > 1 {
                    ((t - t0) / span) as f32 * bounds.width
                } else {
                    bounds.width / 2.0
                };
                let normalized = ((value - mid) / half) as f32;
                Point::new(x, bounds.height / 2.0 - normalized * bounds.height / 2.0)
            };

            let path = Path::new(|builder| {
                for (i, point) in self.points.iter().enumerate() {
                    let point = to_point(*point);
                    if i == 0 {
                        builder.move_to(point);
                    } else {
                        builder.line_to(point);
                    }
                }
            });
            frame.stroke(
                &path,
                Stroke::default().with_width(2.0).with_color(self.color),
            );

            let marker = Path::new(|builder| builder.circle(to_point(*last), 4.0));
            frame.fill(&marker, self.color);
        }

        vec![frame.into_geometry()]
    }
}
