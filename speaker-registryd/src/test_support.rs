//! In-process stand-in for a MusicCast speaker: serves a device description
//! and the control API on 127.0.0.1 and records every control request.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use shared::protocol::{DEFAULT_CONTROL_URL, HEADER_APP_NAME, HEADER_APP_PORT, ST_MEDIA_RENDERER};
use crate::control::ControlEndpoint;
use crate::ssdp::{codec, Service};

pub const FAKE_UDN: &str = "uuid:9ab0c000-f668-11de-9976-00a0de000001";
pub const FAKE_DEVICE_ID: &str = "00A0DED00001";

/// Description document of a MusicCast speaker.
pub fn musiccast_descriptor(url_base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0" xmlns:yamaha="urn:schemas-yamaha-com:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Living Room</friendlyName>
    <manufacturer>Yamaha Corporation</manufacturer>
    <manufacturerURL>http://www.yamaha.com/</manufacturerURL>
    <modelDescription>MusicCast</modelDescription>
    <modelName>WX-021</modelName>
    <UDN>{udn}</UDN>
  </device>
  <yamaha:X_device>
    <yamaha:X_URLBase>{url_base}</yamaha:X_URLBase>
    <yamaha:X_serviceList>
      <yamaha:X_service>
        <yamaha:X_specType>urn:schemas-yamaha-com:service:X_YamahaRemoteControl:1</yamaha:X_specType>
        <yamaha:X_controlURL>/YamahaRemoteControl/ctrl</yamaha:X_controlURL>
      </yamaha:X_service>
      <yamaha:X_service>
        <yamaha:X_specType>urn:schemas-yamaha-com:service:X_YamahaExtendedControl:1</yamaha:X_specType>
        <yamaha:X_yxcControlURL>{control}</yamaha:X_yxcControlURL>
        <yamaha:X_yxcVersion>1930</yamaha:X_yxcVersion>
      </yamaha:X_service>
    </yamaha:X_serviceList>
  </yamaha:X_device>
</root>"#,
        udn = FAKE_UDN,
        url_base = url_base,
        control = DEFAULT_CONTROL_URL,
    )
}

/// A control request as seen by the fake device.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Path below the control URL, e.g. "main/getStatus"
    pub path: String,
    pub query: Option<String>,
    pub app_name: Option<String>,
    pub app_port: Option<String>,
}

struct FakeState {
    base_url: String,
    status: Mutex<Value>,
    response_code: Mutex<i32>,
    http_status: Mutex<StatusCode>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct FakeDevice {
    addr: SocketAddr,
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

impl FakeDevice {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(FakeState {
            base_url: format!("http://{}/", addr),
            status: Mutex::new(json!({
                "power": "on",
                "sleep": 0,
                "volume": 30,
                "mute": false,
                "max_volume": 60,
                "input": "net_radio",
                "input_text": "Net Radio"
            })),
            response_code: Mutex::new(0),
            http_status: Mutex::new(StatusCode::OK),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/desc.xml", get(descriptor))
            .route("/YamahaExtendedControl/v1/*rest", get(control))
            .with_state(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, server }
    }

    pub fn base_url(&self) -> String {
        self.state.base_url.clone()
    }

    pub fn device_id(&self) -> &'static str {
        FAKE_DEVICE_ID
    }

    pub fn endpoint(&self) -> ControlEndpoint {
        ControlEndpoint::new(&self.base_url(), DEFAULT_CONTROL_URL).unwrap()
    }

    /// The search response this device would send.
    pub fn search_response(&self) -> String {
        format!(
            "HTTP/1.1 200 OK\r\n\
             CACHE-CONTROL: max-age=1800\r\n\
             EXT:\r\n\
             LOCATION: http://{}/desc.xml\r\n\
             SERVER: Network_Module/1.0 UPnP/1.0\r\n\
             ST: {}\r\n\
             USN: {}::{}\r\n\r\n",
            self.addr, ST_MEDIA_RENDERER, FAKE_UDN, ST_MEDIA_RENDERER
        )
    }

    pub fn service(&self) -> Service {
        codec::parse_response(self.search_response().as_bytes()).unwrap()
    }

    /// Replace the `getStatus` payload (without `response_code`).
    pub fn set_status(&self, status: Value) {
        *self.state.status.lock().unwrap() = status;
    }

    /// Response code for every subsequent control reply.
    pub fn set_response_code(&self, code: i32) {
        *self.state.response_code.lock().unwrap() = code;
    }

    pub fn set_http_status(&self, status: u16) {
        *self.state.http_status.lock().unwrap() = StatusCode::from_u16(status).unwrap();
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn descriptor(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        musiccast_descriptor(&state.base_url),
    )
}

async fn control(
    State(state): State<Arc<FakeState>>,
    Path(rest): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        path: rest.clone(),
        query: uri.query().map(str::to_string),
        app_name: header_value(HEADER_APP_NAME),
        app_port: header_value(HEADER_APP_PORT),
    });

    let http_status = *state.http_status.lock().unwrap();
    if http_status != StatusCode::OK {
        return (http_status, Json(json!({}))).into_response();
    }

    let mut body = match rest.as_str() {
        "main/getStatus" => state.status.lock().unwrap().clone(),
        "system/getDeviceInfo" => json!({
            "model_name": "WX-021",
            "destination": "BG",
            "device_id": FAKE_DEVICE_ID,
            "system_id": "0B587073",
            "system_version": 2.77,
            "api_version": 2.03,
            "netmodule_version": "1930",
            "serial_number": "Y123456AB",
            "operation_mode": "normal"
        }),
        "netusb/getPlayInfo" => json!({
            "input": "net_radio",
            "playback": "play",
            "repeat": "off",
            "shuffle": "off",
            "play_time": 42,
            "total_time": 0,
            "artist": "Radio One",
            "album": "",
            "track": "Morning Show",
            "albumart_url": ""
        }),
        _ => json!({}),
    };
    if let Value::Object(map) = &mut body {
        map.insert(
            "response_code".to_string(),
            json!(*state.response_code.lock().unwrap()),
        );
    }
    Json(body).into_response()
}
