//! Upload page (HTML + vanilla JS, driven by the SSE stream)

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::AppState;

/// Build UI routes
pub fn ui_routes() -> Router<AppState> {
    Router::new().route("/", get(root_page))
}

/// GET /
async fn root_page() -> impl IntoResponse {
    Html(ROOT_PAGE)
}

const ROOT_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>SonicScribe</title>
    <style>
        body {
            font-family: system-ui, -apple-system, sans-serif;
            max-width: 960px;
            margin: 40px auto;
            padding: 20px;
            line-height: 1.6;
        }
        h1 {
            color: #333;
            border-bottom: 2px solid #3a6fd8;
            padding-bottom: 10px;
        }
        .button {
            display: inline-block;
            padding: 8px 18px;
            background: #3a6fd8;
            color: white;
            border: none;
            border-radius: 4px;
            margin: 6px 4px;
            cursor: pointer;
        }
        .button:disabled { background: #999; cursor: default; }
        #status { color: #555; }
        #error { color: #b00020; }
        #view { overflow-x: auto; border: 1px solid #ddd; min-height: 120px; }
        .hidden { display: none; }
    </style>
</head>
<body>
    <h1>SonicScribe</h1>
    <p>Upload an audio recording or a MIDI file to get a score.</p>

    <div id="intake">
        <input type="file" id="file" accept="audio/*,.mid,.midi">
    </div>
    <p id="status">Loading transcription model...</p>
    <p id="error" class="hidden"></p>
    <button id="retry" class="button hidden">Retry</button>

    <div id="results" class="hidden">
        <button id="toggle" class="button">Toggle View</button>
        <a id="dl-xml" class="button">Download MusicXML</a>
        <a id="dl-midi" class="button">Download MIDI</a>
        <button id="more" class="button">Convert More</button>
        <div id="view"></div>
    </div>

    <script>
        let sessionId = null;
        const el = (id) => document.getElementById(id);

        async function api(method, path, body) {
            const res = await fetch(path, { method, body });
            if (!res.ok && res.status !== 204) {
                const err = await res.json().catch(() => ({}));
                throw new Error(err.error ? err.error.message : res.statusText);
            }
            return res.status === 204 ? null : res;
        }

        async function refresh() {
            const snap = await (await api('GET', `/sessions/${sessionId}`)).json();
            const loading = snap.model_readiness !== 'READY';
            el('file').disabled = loading;
            el('status').textContent = loading
                ? 'Loading transcription model...'
                : `${snap.phase}${snap.file_name ? ' - ' + snap.file_name : ''}`;
            el('error').classList.toggle('hidden', !snap.last_error);
            el('error').textContent = snap.last_error
                ? `${snap.last_error.kind}: ${snap.last_error.message}` : '';
            el('retry').classList.toggle('hidden', snap.phase !== 'ERROR');
            el('results').classList.toggle('hidden', snap.phase !== 'READY');
            if (snap.phase === 'READY') {
                el('view').innerHTML = await (await api('GET', `/sessions/${sessionId}/view`)).text();
            }
        }

        el('file').addEventListener('change', async (e) => {
            const file = e.target.files[0];
            if (!file) return;
            await api('PUT', `/sessions/${sessionId}/file?name=${encodeURIComponent(file.name)}`, file);
            await refresh();
        });
        el('retry').addEventListener('click', async () => {
            await api('POST', `/sessions/${sessionId}/retry`);
            await refresh();
        });
        el('toggle').addEventListener('click', async () => {
            await api('POST', `/sessions/${sessionId}/view/toggle`);
            await refresh();
        });
        el('more').addEventListener('click', async () => {
            await api('POST', `/sessions/${sessionId}/reset`);
            el('file').value = '';
            await refresh();
        });

        async function start() {
            const res = await api('POST', '/sessions');
            sessionId = (await res.json()).session_id;
            el('dl-xml').href = `/sessions/${sessionId}/export/musicxml`;
            el('dl-midi').href = `/sessions/${sessionId}/export/midi`;

            const events = new EventSource(`/events?session_id=${sessionId}`);
            for (const type of ['ModelStateChanged', 'SessionPhaseChanged', 'NoteSequenceReady', 'TranscriptionFailed']) {
                events.addEventListener(type, () => refresh().catch(console.error));
            }
            window.addEventListener('beforeunload', () => {
                navigator.sendBeacon && fetch(`/sessions/${sessionId}`, { method: 'DELETE', keepalive: true });
            });
            await refresh();
        }

        start().catch((e) => {
            el('error').textContent = e.message;
            el('error').classList.remove('hidden');
        });
    </script>
</body>
</html>
"#;
