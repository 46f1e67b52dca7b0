use crate::gui_bridge::model::RollingHistory;
use anyhow::Context;
use echocore::{ControlRequest, SharedParams};
use log::{info, warn};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter, Rejection, Reply};

pub type SharedHistory = Arc<RwLock<RollingHistory>>;

pub fn gui_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

/// HTTP surface for the display and the operator controls.
///
/// `GET /history` serves the rolling display model, `GET /params` the live
/// parameter snapshot, and `POST /control` applies one [`ControlRequest`].
pub fn routes(
    params: Arc<SharedParams>,
    history: SharedHistory,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let params_filter = warp::any().map(move || params.clone());
    let history_filter = warp::any().map(move || history.clone());

    let history_route = warp::path("history")
        .and(warp::path::end())
        .and(warp::get())
        .and(history_filter)
        .map(|history: SharedHistory| {
            let guard = history
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            warp::reply::json(&guard.model())
        });

    let params_route = warp::path("params")
        .and(warp::path::end())
        .and(warp::get())
        .and(params_filter.clone())
        .map(|params: Arc<SharedParams>| warp::reply::json(&*params.snapshot()));

    let control_route = warp::path("control")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(params_filter)
        .map(
            |request: ControlRequest, params: Arc<SharedParams>| match request.apply(&params) {
                Ok(snapshot) => {
                    info!("[bridge] applied {:?} -> version {}", request, snapshot.version);
                    warp::reply::with_status(warp::reply::json(&*snapshot), StatusCode::OK)
                }
                Err(err) => {
                    warn!("[bridge] rejected {:?}: {}", request, err);
                    warp::reply::with_status(
                        warp::reply::json(&json!({ "error": err.to_string() })),
                        StatusCode::BAD_REQUEST,
                    )
                }
            },
        );

    history_route.or(params_route).or(control_route)
}

/// Serves [`routes`] from a background thread with its own runtime.
pub struct GuiBridge {
    address: SocketAddr,
}

impl GuiBridge {
    pub fn start(
        params: Arc<SharedParams>,
        history: SharedHistory,
        address: SocketAddr,
    ) -> anyhow::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building runtime for the HTTP bridge")?;
        let routes = routes(params, history);
        thread::Builder::new()
            .name("gui-bridge".into())
            .spawn(move || {
                runtime.block_on(async move {
                    warp::serve(routes).run(address).await;
                });
            })
            .context("spawning HTTP bridge thread")?;
        info!("[bridge] listening on http://{address}");
        Ok(Self { address })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echocore::messages::{DisplayModel, EstimateMessage};
    use echocore::params::ParamSnapshot;
    use echocore::RadarConfig;

    fn fixtures() -> (Arc<SharedParams>, SharedHistory) {
        let params = Arc::new(SharedParams::new(RadarConfig::default()).unwrap());
        let history = Arc::new(RwLock::new(RollingHistory::new(60.0)));
        (params, history)
    }

    #[tokio::test]
    async fn params_endpoint_serves_current_snapshot() {
        let (params, history) = fixtures();
        let filter = routes(params, history);
        let response = warp::test::request()
            .method("GET")
            .path("/params")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot: ParamSnapshot = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(snapshot.version, 0);
        assert!((snapshot.derived.range_res - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn control_endpoint_applies_setter() {
        let (params, history) = fixtures();
        let filter = routes(params.clone(), history);
        let response = warp::test::request()
            .method("POST")
            .path("/control")
            .json(&ControlRequest::Threshold(3.0))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(params.snapshot().config.threshold, 3.0);
    }

    #[tokio::test]
    async fn invalid_control_value_is_a_bad_request() {
        let (params, history) = fixtures();
        let filter = routes(params.clone(), history);
        let response = warp::test::request()
            .method("POST")
            .path("/control")
            .json(&ControlRequest::DecimFac(2.5))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(params.snapshot().version, 0);
    }

    #[tokio::test]
    async fn history_endpoint_serves_rolling_window() {
        let (params, history) = fixtures();
        history.write().unwrap().push(EstimateMessage {
            seq: 0,
            timestamp: 0.0,
            range: 12.5,
            velocity: None,
            frequency: 0.0,
            magnitude: 4.0,
            range_res: 25.0,
            velocity_res: 0.2,
        });
        let filter = routes(params, history);
        let response = warp::test::request()
            .method("GET")
            .path("/history")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let model: DisplayModel = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(model.estimates.len(), 1);
        assert_eq!(model.range_time, 60.0);
    }
}
