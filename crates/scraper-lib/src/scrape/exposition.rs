//! Line scanner for proxy metrics pages
//!
//! Picks two samples out of a Prometheus text exposition by literal
//! substring match. Lines are not otherwise interpreted: comments and
//! `# TYPE` lines are scanned like any other.

use tracing::debug;

/// Sample recorded when a matched line's value is not an integer
pub const PARSE_FAILURE_SAMPLE: i64 = 0;

/// Raw single-replica samples from one metrics page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpositionSample {
    pub total_requests: i64,
    pub active_requests: i64,
}

/// Scan `body` for the total and active request lines.
///
/// A line counts when it contains the pattern and splits on single spaces
/// into exactly two tokens. When several lines match, the last one wins.
/// Samples with no matching line stay 0.
pub fn parse_exposition(
    body: &str,
    total_pattern: &str,
    active_pattern: &str,
) -> ExpositionSample {
    let mut sample = ExpositionSample::default();

    for line in body.lines() {
        if let Some(value) = sample_value(line, total_pattern) {
            sample.total_requests = value;
        }
        if let Some(value) = sample_value(line, active_pattern) {
            sample.active_requests = value;
        }
    }

    sample
}

fn sample_value(line: &str, pattern: &str) -> Option<i64> {
    if pattern.is_empty() || !line.contains(pattern) {
        return None;
    }

    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() != 2 {
        return None;
    }

    Some(parts[1].parse().unwrap_or_else(|_| {
        debug!(line = %line, "Unparseable sample value, using fallback");
        PARSE_FAILURE_SAMPLE
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVOY_TOTAL: &str =
        r#"envoy_http_downstream_rq_total{http_conn_manager_prefix="10.0.0.5_8080"}"#;
    const ENVOY_ACTIVE: &str =
        r#"envoy_http_downstream_rq_active{http_conn_manager_prefix="10.0.0.5_8080"}"#;

    #[test]
    fn test_total_without_active_line() {
        let body = r#"envoy_http_downstream_rq_total{http_conn_manager_prefix="10.0.0.5_8080"} 42"#;

        let sample = parse_exposition(body, ENVOY_TOTAL, ENVOY_ACTIVE);
        assert_eq!(sample.total_requests, 42);
        assert_eq!(sample.active_requests, 0);
    }

    #[test]
    fn test_envoy_page() {
        let body = r#"# TYPE envoy_http_downstream_rq_total counter
envoy_http_downstream_rq_total{http_conn_manager_prefix="admin"} 7
envoy_http_downstream_rq_total{http_conn_manager_prefix="10.0.0.5_8080"} 1500
# TYPE envoy_http_downstream_rq_active gauge
envoy_http_downstream_rq_active{http_conn_manager_prefix="admin"} 1
envoy_http_downstream_rq_active{http_conn_manager_prefix="10.0.0.5_8080"} 12
"#;

        let sample = parse_exposition(body, ENVOY_TOTAL, ENVOY_ACTIVE);
        assert_eq!(
            sample,
            ExpositionSample {
                total_requests: 1500,
                active_requests: 12,
            }
        );
    }

    #[test]
    fn test_linkerd_page() {
        let body = "request_handle_us_count{direction=\"inbound\"} 311\r\n\
tcp_open_connections{direction=\"inbound\",peer=\"src\",tls=\"no_identity\",no_tls_reason=\"not_provided_by_remote\"} 3\r\n";

        let sample = parse_exposition(
            body,
            r#"request_handle_us_count{direction="inbound"}"#,
            r#"tcp_open_connections{direction="inbound",peer="src",tls="no_identity",no_tls_reason="not_provided_by_remote"}"#,
        );
        assert_eq!(sample.total_requests, 311);
        assert_eq!(sample.active_requests, 3);
    }

    #[test]
    fn test_last_match_wins() {
        let body = format!("{} 10\n{} 20\n", ENVOY_TOTAL, ENVOY_TOTAL);

        let sample = parse_exposition(&body, ENVOY_TOTAL, ENVOY_ACTIVE);
        assert_eq!(sample.total_requests, 20);
    }

    #[test]
    fn test_unparseable_value_uses_fallback() {
        let body = format!("{} 10\n{} NaN\n{} 4\n", ENVOY_TOTAL, ENVOY_TOTAL, ENVOY_ACTIVE);

        let sample = parse_exposition(&body, ENVOY_TOTAL, ENVOY_ACTIVE);
        assert_eq!(sample.total_requests, PARSE_FAILURE_SAMPLE);
        assert_eq!(sample.active_requests, 4);
    }

    #[test]
    fn test_float_value_uses_fallback() {
        let body = format!("{} 12.5\n", ENVOY_ACTIVE);

        let sample = parse_exposition(&body, ENVOY_TOTAL, ENVOY_ACTIVE);
        assert_eq!(sample.active_requests, PARSE_FAILURE_SAMPLE);
    }

    #[test]
    fn test_lines_with_extra_tokens_are_ignored() {
        // Timestamped samples and double spaces split into more than two tokens
        let body = format!(
            "{} 10\n{} 99 1700000000000\n{}  50\n",
            ENVOY_TOTAL, ENVOY_TOTAL, ENVOY_TOTAL
        );

        let sample = parse_exposition(&body, ENVOY_TOTAL, ENVOY_ACTIVE);
        assert_eq!(sample.total_requests, 10);
    }

    #[test]
    fn test_empty_patterns_match_nothing() {
        let body = "some_metric 5\nother_metric 6\n";

        let sample = parse_exposition(body, "", "");
        assert_eq!(sample, ExpositionSample::default());
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(
            parse_exposition("", ENVOY_TOTAL, ENVOY_ACTIVE),
            ExpositionSample::default()
        );
    }
}
