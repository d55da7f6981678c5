use axum::{extract::State, response::Html};

use crate::AppState;

/// GET / — landing page pointing at the telemetry path.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let path = &state.config.telemetry_path;
    Html(format!(
        "<html>
<head><title>Mastodon exporter</title></head>
<body>
<h1>Mastodon exporter</h1>
<p><a href='{path}'>Metrics</a></p>
</body>
</html>"
    ))
}
