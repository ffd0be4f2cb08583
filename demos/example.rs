use schemacfg::Config;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct AppConfig {
    server: ServerSection,
    tls: TlsSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    env: String,
    port: u16,
    upstream: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TlsSection {
    #[serde(rename = "use")]
    enabled: bool,
    #[serde(rename = "certPath")]
    cert_path: Option<String>,
}

fn main() -> Result<(), schemacfg::ConfigError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Values come from ~/.config/schemacfg-demo/env.toml, then the environment
    let config: AppConfig = Config::builder()
        .with_schema(json!({
            "$appName": "schemacfg-demo",
            "server": {
                "env": {
                    "desc": "deployment environment",
                    "env": "APP_ENV",
                    "format": ["development", "production", "test"],
                    "caseInsensitive": true
                },
                "port": { "desc": "listen port", "env": "PORT", "format": "port" },
                "upstream": {
                    "desc": "upstream service",
                    "env": "UPSTREAM_URL",
                    "format": "url",
                    "assembleFrom": {
                        "protocol": { "env": "UPSTREAM_PROTOCOL", "default": "http" },
                        "host": "UPSTREAM_HOST",
                        "port": "UPSTREAM_PORT"
                    }
                }
            },
            "tls": {
                "use": { "desc": "serve over tls", "env": "USE_TLS", "format": "boolean", "optional": true },
                "certPath": {
                    "desc": "certificate path",
                    "env": "TLS_CERT_PATH",
                    "format": "path",
                    "requiredWhen": "tls.use"
                }
            }
        }))
        .on_warning(|warnings| {
            for warning in warnings {
                eprintln!("warning: {warning}");
            }
        })
        .build_into()?;

    println!(
        "{} on port {} (upstream {}, tls={})",
        config.server.env, config.server.port, config.server.upstream, config.tls.enabled
    );

    Ok(())
}
