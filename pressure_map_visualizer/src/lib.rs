// THEORY:
// The visualizer is the dashboard's web surface. It never touches channel state
// directly: it reads the `SnapshotBus` published by the scheduler and keeps one
// `ViewerSession` per connected browser, so thresholds are private to each
// viewer. Play and pause go back to the scheduler through its `ControlHandle`.
//
// Everything that needs axum or leptos sits behind the `web` feature. Without
// it, the crate still offers session handling and PNG rendering.

pub mod heatmap_png;
pub mod session;

use pressure_map::pipeline::SnapshotBus;
use pressure_map::scheduler::ControlHandle;

pub use session::{ClientMessage, ServerMessage, SessionError, ViewerSession};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Panel titles, one per channel.
    pub channel_labels: Vec<String>,
    /// Edge length of one grid cell in rendered PNGs.
    pub heatmap_cell_px: u32,
}

impl ServerConfig {
    pub fn new(bind_addr: impl Into<String>, channel_count: usize) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            channel_labels: (0..channel_count)
                .map(|i| format!("Pressure Map {}", i + 1))
                .collect(),
            heatmap_cell_px: 40,
        }
    }
}

#[cfg(feature = "web")]
pub async fn start_server(
    bus: SnapshotBus,
    cfg: ServerConfig,
    control: ControlHandle,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    use anyhow::Context;
    use axum::extract::Path;
    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::http::{StatusCode, header};
    use axum::response::{Html, IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use futures_util::{Sink, SinkExt, StreamExt};
    use leptos::*;
    use pressure_map::pipeline::ChannelId;
    use tokio::sync::broadcast::error::RecvError;
    use tracing::{debug, error, info, warn};

    #[component]
    fn ChannelPanel(index: usize, label: String) -> impl IntoView {
        view! {
            <div style="width:45%;">
                <h4 style="text-align:center; margin-top:50px; color:#481567FF">{label}</h4>
                <canvas id={format!("heatmap{index}")} width="360" height="480"></canvas>
                <canvas id={format!("lineplot{index}")} width="360" height="220"></canvas>
                <div id={format!("metric{index}")} style="text-align:left; font-size:16px"></div>
                <label>"Threshold: "<span id={format!("threshold{index}")}>"50"</span>"%"</label>
                <input
                    type="range"
                    min="0"
                    max="100"
                    step="10"
                    value="50"
                    style="width:100%"
                    data-channel={index.to_string()}
                />
            </div>
        }
    }

    #[component]
    fn App(labels: Vec<String>) -> impl IntoView {
        view! {
            <main style="font-family:sans-serif">
                <h2 style="text-align:center; color:#481567FF">"Pressure Map Dashboard"</h2>
                <div style="margin: 8px 0; display:flex; gap:12px; align-items:center; justify-content:center;">
                    <button id="btn-play" style="padding:6px 12px;">"Play"</button>
                    <button id="btn-pause" style="padding:6px 12px;">"Pause"</button>
                    <span id="status" style="font-family:monospace; font-size:12px; color:#777">"connecting"</span>
                </div>
                <div style="display:flex; gap:24px; justify-content:center;">
                    {labels
                        .into_iter()
                        .enumerate()
                        .map(|(index, label)| view! { <ChannelPanel index=index label=label/> })
                        .collect_view()}
                </div>
                <script src="/client.js"></script>
            </main>
        }
    }

    // Draws the figures the server renders for this viewer and sends slider moves back.
    const CLIENT_JS: &str = r#"(function(){
        const VIRIDIS = [[68,1,84],[71,45,123],[59,82,139],[44,114,142],[33,145,140],[40,174,128],[94,201,98],[173,220,48],[253,231,37]];
        const status = (t)=>{ const el=document.getElementById('status'); if(el) el.textContent=t; };
        const btnPlay = document.getElementById('btn-play');
        const btnPause = document.getElementById('btn-pause');
        if(btnPlay){ btnPlay.onclick = ()=> fetch('/control/play', { method:'POST' }).then(()=>status('playing')); }
        if(btnPause){ btnPause.onclick = ()=> fetch('/control/pause', { method:'POST' }).then(()=>status('paused')); }
        const colour = (t)=>{
            t = Number.isFinite(t) ? Math.min(1, Math.max(0, t)) : 0;
            const s = t*(VIRIDIS.length-1);
            const i = Math.min(Math.floor(s), VIRIDIS.length-2);
            const f = s-i, a = VIRIDIS[i], b = VIRIDIS[i+1];
            return 'rgb('+a.map((v,k)=>Math.round(v+(b[k]-v)*f)).join(',')+')';
        };
        const drawHeatmap = (canvas, z)=>{
            if(!canvas || !z.length) return;
            const ctx = canvas.getContext('2d');
            const rows = z.length, cols = z[0].length;
            let lo = Infinity, hi = -Infinity;
            z.forEach(r=>r.forEach(v=>{ lo=Math.min(lo,v); hi=Math.max(hi,v); }));
            const span = hi-lo, cw = canvas.width/cols, ch = canvas.height/rows;
            z.forEach((r,i)=>r.forEach((v,j)=>{
                ctx.fillStyle = colour(span>0 ? (v-lo)/span : 0.5);
                ctx.fillRect(j*cw, canvas.height-(i+1)*ch, Math.ceil(cw), Math.ceil(ch));
            }));
        };
        const drawLine = (canvas, fig)=>{
            if(!canvas) return;
            const ctx = canvas.getContext('2d');
            const w = canvas.width, h = canvas.height, pad = 28;
            ctx.clearRect(0,0,w,h);
            ctx.fillStyle = '#333'; ctx.font = '12px sans-serif';
            ctx.fillText(fig.title, pad, 14);
            ctx.fillText(fig.x_title, w/2, h-4);
            ctx.fillText(fig.y_title, 2, h/2);
            const ys = fig.y;
            if(!ys.length) return;
            const max = ys.reduce((m,v)=>Math.max(m,v), 1);
            const step = ys.length>1 ? (w-2*pad)/(ys.length-1) : 0;
            ctx.strokeStyle = fig.line_color; ctx.lineWidth = 1.5;
            ctx.beginPath();
            ys.forEach((v,i)=>{
                const x = pad+i*step, y = h-pad-(v/max)*(h-2*pad);
                if(i===0) ctx.moveTo(x,y); else ctx.lineTo(x,y);
            });
            ctx.stroke();
        };
        let ws = null;
        const connect = ()=>{
            ws = new WebSocket((location.protocol==='https:'?'wss://':'ws://')+location.host+'/ws/channels');
            ws.onopen = ()=>{
                status('connected');
                document.querySelectorAll('input[data-channel]').forEach(el=>{
                    ws.send(JSON.stringify({type:'threshold', channel:Number(el.dataset.channel), value:Number(el.value)}));
                });
            };
            ws.onclose = ()=>{ status('disconnected'); setTimeout(connect, 1000); };
            ws.onmessage = (ev)=>{
                const msg = JSON.parse(ev.data);
                if(msg.type==='snapshot'){
                    drawHeatmap(document.getElementById('heatmap'+msg.channel), msg.rendering.heatmap.z);
                    drawLine(document.getElementById('lineplot'+msg.channel), msg.rendering.line_chart);
                    const m = document.getElementById('metric'+msg.channel); if(m) m.innerHTML = msg.metric_html;
                } else if(msg.type==='metric'){
                    const m = document.getElementById('metric'+msg.channel); if(m) m.innerHTML = msg.metric_html;
                } else if(msg.type==='error'){
                    console.warn(msg.message);
                }
            };
        };
        document.querySelectorAll('input[data-channel]').forEach(el=>{
            el.oninput = ()=>{
                const label = document.getElementById('threshold'+el.dataset.channel);
                if(label) label.textContent = el.value;
                if(ws && ws.readyState===1){
                    ws.send(JSON.stringify({type:'threshold', channel:Number(el.dataset.channel), value:Number(el.value)}));
                }
            };
        });
        connect();
    })();"#;

    async fn send_reply<S>(
        ws_tx: &mut S,
        reply: Result<Option<ServerMessage>, SessionError>,
    ) -> Result<(), axum::Error>
    where
        S: Sink<Message, Error = axum::Error> + Unpin,
    {
        let message = match reply {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(%err, "viewer update failed");
                ServerMessage::error(&err)
            }
        };
        match message.to_json() {
            Ok(json) => ws_tx.send(Message::Text(json)).await,
            Err(err) => {
                warn!(%err, "could not serialize viewer message");
                Ok(())
            }
        }
    }

    async fn viewer_conn(socket: WebSocket, bus: SnapshotBus) {
        // Subscribe before reading the latest slots so nothing published in
        // between is missed. Duplicates are dropped by the session.
        let mut updates = bus.subscribe();
        let mut session = ViewerSession::new(bus.channel_count());
        let (mut ws_tx, mut ws_rx) = socket.split();
        info!("viewer connected");

        for channel in 0..bus.channel_count() {
            if let Some(latest) = bus.latest(ChannelId(channel)) {
                let reply = session.apply(&latest);
                if send_reply(&mut ws_tx, reply).await.is_err() {
                    return;
                }
            }
        }

        loop {
            let reply = tokio::select! {
                update = updates.recv() => match update {
                    Ok(published) => session.apply(&published),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "viewer lagged behind the snapshot stream");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = ws_rx.next() => match incoming {
                    Some(Ok(Message::Text(text))) => session.handle_text(&text),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                },
            };
            if send_reply(&mut ws_tx, reply).await.is_err() {
                break;
            }
        }
        info!("viewer disconnected");
    }

    fn latest_payload(bus: &SnapshotBus, id: usize) -> Response {
        if id >= bus.channel_count() {
            return StatusCode::NOT_FOUND.into_response();
        }
        match bus.latest(ChannelId(id)) {
            Some(published) => (
                [(header::CONTENT_TYPE, "application/json")],
                published.payload.to_string(),
            )
                .into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        }
    }

    fn heatmap_response(bus: &SnapshotBus, id: usize, cell_px: u32) -> Response {
        if id >= bus.channel_count() {
            return StatusCode::NOT_FOUND.into_response();
        }
        let Some(published) = bus.latest(ChannelId(id)) else {
            return StatusCode::NO_CONTENT.into_response();
        };
        let snapshot = match pressure_map::decode(&published.payload) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return StatusCode::NO_CONTENT.into_response(),
            Err(err) => {
                warn!(channel = id, %err, "latest payload did not decode");
                return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
            }
        };
        match crate::heatmap_png::render_png(&snapshot.grid, cell_px) {
            Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
            Err(err) => {
                warn!(channel = id, %err, "heatmap encoding failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }

    let labels = cfg.channel_labels.clone();
    let page = leptos::ssr::render_to_string(move || view! { <App labels=labels/> }).to_string();

    let bus_ws = bus.clone();
    let bus_latest = bus.clone();
    let bus_png = bus.clone();
    let cell_px = cfg.heatmap_cell_px;
    let app = Router::new()
        .route("/", get(move || {
            let page = page.clone();
            async move { Html(page) }
        }))
        .route("/healthz", get(|| async { "ok" }))
        .route("/client.js", get(|| async {
            ([(header::CONTENT_TYPE, "application/javascript")], CLIENT_JS)
        }))
        .route("/ws/channels", get(move |ws: WebSocketUpgrade| {
            let bus = bus_ws.clone();
            async move { ws.on_upgrade(move |socket| viewer_conn(socket, bus)) }
        }))
        .route("/api/channels/:id/latest", get(move |Path(id): Path<usize>| {
            let bus = bus_latest.clone();
            async move { latest_payload(&bus, id) }
        }))
        .route("/api/channels/:id/heatmap.png", get(move |Path(id): Path<usize>| {
            let bus = bus_png.clone();
            async move { heatmap_response(&bus, id, cell_px) }
        }))
        .route("/control/play", post({
            let control = control.clone();
            move || {
                let control = control.clone();
                async move {
                    control.play();
                    info!("playback resumed");
                    StatusCode::NO_CONTENT
                }
            }
        }))
        .route("/control/pause", post({
            let control = control.clone();
            move || {
                let control = control.clone();
                async move {
                    control.pause();
                    info!("playback paused");
                    StatusCode::NO_CONTENT
                }
            }
        }))
        .route("/control/state", get(move || {
            let playing = control.is_playing();
            async move { Json(serde_json::json!({ "playing": playing })) }
        }));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding visualizer server to {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, channels = bus.channel_count(), "visualizer server listening");

    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(%err, "visualizer server stopped");
        }
    });

    Ok(server)
}

#[cfg(not(feature = "web"))]
pub async fn start_server(
    _bus: SnapshotBus,
    _cfg: ServerConfig,
    _control: ControlHandle,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for pressure_map_visualizer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_labels_follow_channel_order() {
        let cfg = ServerConfig::new("127.0.0.1:0", 2);
        assert_eq!(cfg.channel_labels, vec!["Pressure Map 1", "Pressure Map 2"]);
    }
}
