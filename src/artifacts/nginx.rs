//! nginx reverse-proxy configuration renderer.
//!
//! The configuration is first assembled into a small model (server blocks,
//! route classes, optional compression and HSTS) and then written out through
//! `Display` impls, one per section.

use std::fmt;

use super::Renderer;
use crate::config::{ConfigTree, FirewallConfig};
use crate::domain::DeployError;

const UPSTREAM: &str = "app_backend";
const RATE_LIMIT_ZONE: &str = "api_limit";
const RATE_LIMIT_BURST: u32 = 20;
const GZIP_TYPES: &str = concat!(
    "text/plain text/css text/xml ",
    "application/json application/javascript application/xml image/svg+xml"
);

/// Renders the reverse-proxy configuration.
pub struct NginxRenderer;

/// Proxy timeouts in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyTimeouts {
    pub connect: u32,
    pub send: u32,
    pub read: u32,
}

/// Routes that get their own location block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Api,
    StaticAssets,
    Default,
}

impl RouteClass {
    const ALL: [RouteClass; 3] = [RouteClass::Api, RouteClass::StaticAssets, RouteClass::Default];

    pub fn timeouts(self) -> ProxyTimeouts {
        match self {
            RouteClass::Api => ProxyTimeouts {
                connect: 5,
                send: 60,
                read: 60,
            },
            RouteClass::StaticAssets => ProxyTimeouts {
                connect: 5,
                send: 30,
                read: 30,
            },
            RouteClass::Default => ProxyTimeouts {
                connect: 10,
                send: 30,
                read: 30,
            },
        }
    }

    fn matcher(self) -> &'static str {
        match self {
            RouteClass::Api => "/api/",
            RouteClass::StaticAssets => {
                r"~* \.(?:css|js|mjs|png|jpe?g|gif|svg|ico|webp|woff2?|ttf)$"
            }
            RouteClass::Default => "/",
        }
    }
}

/// One `server { ... }` block.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServerBlock {
    /// Port 80 redirect to HTTPS
    Redirect { domain: String },
    /// Port 443 TLS termination
    Tls {
        domain: String,
        cert_path: String,
        key_path: String,
        protocols: Vec<String>,
    },
    /// Port 80 without TLS
    Plain { domain: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    class: RouteClass,
    /// `expires` for static assets, seconds
    expires: Option<u64>,
}

/// Client address filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Access {
    /// No allow/deny directives
    Open,
    /// The allow-list contains an entry admitting every address
    AllowAll,
    /// Only the listed addresses, everything else denied
    Restricted(Vec<String>),
}

impl Access {
    fn from_firewall(firewall: &FirewallConfig) -> Self {
        let entries: Vec<String> = firewall
            .allow_list
            .iter()
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();

        if !firewall.enabled || entries.is_empty() {
            Access::Open
        } else if firewall.allows_all() {
            Access::AllowAll
        } else {
            Access::Restricted(entries)
        }
    }
}

/// Everything a content-serving server block needs besides its listener.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Routing {
    hsts_max_age: Option<u64>,
    access: Access,
    health_path: Option<String>,
    locations: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProxyConfig {
    comment: String,
    upstream_port: u16,
    requests_per_minute: u64,
    gzip_level: Option<u32>,
    servers: Vec<ServerBlock>,
    routing: Routing,
}

impl ProxyConfig {
    fn from_config(config: &ConfigTree) -> Self {
        let tls = &config.security.tls;
        let compression = &config.performance.compression;
        let firewall = &config.security.firewall;
        let cache = &config.performance.cache;
        let domain = config.environment.domain.clone();

        let servers = if tls.enabled {
            vec![
                ServerBlock::Redirect {
                    domain: domain.clone(),
                },
                ServerBlock::Tls {
                    domain,
                    cert_path: tls.cert_path.clone(),
                    key_path: tls.key_path.clone(),
                    protocols: tls.protocols.clone(),
                },
            ]
        } else {
            vec![ServerBlock::Plain { domain }]
        };

        let locations = RouteClass::ALL
            .into_iter()
            .map(|class| Location {
                class,
                expires: (class == RouteClass::StaticAssets && cache.enabled)
                    .then_some(cache.ttl_seconds),
            })
            .collect();

        Self {
            comment: format!(
                "{} ({})",
                config.environment.name, config.environment.domain
            ),
            upstream_port: config.deployment.port,
            requests_per_minute: firewall.rate_limit.requests_per_minute(),
            gzip_level: compression.gzip.then_some(compression.level),
            servers,
            routing: Routing {
                hsts_max_age: tls.hsts.then_some(tls.hsts_max_age),
                access: Access::from_firewall(firewall),
                health_path: config
                    .monitoring
                    .health_check
                    .enabled
                    .then(|| config.monitoring.health_check.path.clone()),
                locations,
            },
        }
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Reverse proxy for {}", self.comment)?;
        writeln!(f)?;
        writeln!(f, "upstream {} {{", UPSTREAM)?;
        writeln!(f, "    least_conn;")?;
        writeln!(
            f,
            "    server app:{} max_fails=3 fail_timeout=30s;",
            self.upstream_port
        )?;
        writeln!(f, "    keepalive 32;")?;
        writeln!(f, "}}")?;
        writeln!(f)?;
        writeln!(
            f,
            "limit_req_zone $binary_remote_addr zone={}:10m rate={}r/m;",
            RATE_LIMIT_ZONE, self.requests_per_minute
        )?;

        if let Some(level) = self.gzip_level {
            writeln!(f)?;
            writeln!(f, "gzip on;")?;
            writeln!(f, "gzip_vary on;")?;
            writeln!(f, "gzip_proxied any;")?;
            writeln!(f, "gzip_comp_level {};", level)?;
            writeln!(f, "gzip_min_length 1024;")?;
            writeln!(f, "gzip_types {};", GZIP_TYPES)?;
        }

        for server in &self.servers {
            writeln!(f)?;
            match server {
                ServerBlock::Redirect { domain } => {
                    writeln!(f, "server {{")?;
                    writeln!(f, "    listen 80;")?;
                    writeln!(f, "    listen [::]:80;")?;
                    writeln!(f, "    server_name {};", domain)?;
                    writeln!(f)?;
                    writeln!(f, "    return 301 https://$host$request_uri;")?;
                    writeln!(f, "}}")?;
                }
                ServerBlock::Tls {
                    domain,
                    cert_path,
                    key_path,
                    protocols,
                } => {
                    writeln!(f, "server {{")?;
                    writeln!(f, "    listen 443 ssl http2;")?;
                    writeln!(f, "    listen [::]:443 ssl http2;")?;
                    writeln!(f, "    server_name {};", domain)?;
                    writeln!(f)?;
                    writeln!(f, "    ssl_certificate {};", cert_path)?;
                    writeln!(f, "    ssl_certificate_key {};", key_path)?;
                    if !protocols.is_empty() {
                        writeln!(f, "    ssl_protocols {};", protocols.join(" "))?;
                    }
                    writeln!(f, "    ssl_prefer_server_ciphers on;")?;
                    writeln!(f, "    ssl_session_cache shared:SSL:10m;")?;
                    writeln!(f, "    ssl_session_timeout 10m;")?;
                    write!(f, "{}", self.routing)?;
                    writeln!(f, "}}")?;
                }
                ServerBlock::Plain { domain } => {
                    writeln!(f, "server {{")?;
                    writeln!(f, "    listen 80;")?;
                    writeln!(f, "    listen [::]:80;")?;
                    writeln!(f, "    server_name {};", domain)?;
                    write!(f, "{}", self.routing)?;
                    writeln!(f, "}}")?;
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for Routing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        if let Some(max_age) = self.hsts_max_age {
            writeln!(
                f,
                "    add_header Strict-Transport-Security \"max-age={}; includeSubDomains\" always;",
                max_age
            )?;
        }
        writeln!(f, "    add_header X-Frame-Options \"SAMEORIGIN\" always;")?;
        writeln!(f, "    add_header X-Content-Type-Options \"nosniff\" always;")?;
        writeln!(
            f,
            "    add_header Referrer-Policy \"strict-origin-when-cross-origin\" always;"
        )?;

        match &self.access {
            Access::Open => {}
            Access::AllowAll => {
                writeln!(f)?;
                writeln!(f, "    allow all;")?;
            }
            Access::Restricted(entries) => {
                writeln!(f)?;
                for entry in entries {
                    writeln!(f, "    allow {};", entry)?;
                }
                writeln!(f, "    deny all;")?;
            }
        }

        if let Some(path) = &self.health_path {
            writeln!(f)?;
            writeln!(f, "    location = {} {{", path)?;
            writeln!(f, "        access_log off;")?;
            writeln!(f, "        proxy_pass http://{};", UPSTREAM)?;
            writeln!(f, "    }}")?;
        }

        for location in &self.locations {
            writeln!(f)?;
            write!(f, "{}", location)?;
        }
        Ok(())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    location {} {{", self.class.matcher())?;
        match self.class {
            RouteClass::Api => {
                writeln!(
                    f,
                    "        limit_req zone={} burst={} nodelay;",
                    RATE_LIMIT_ZONE, RATE_LIMIT_BURST
                )?;
            }
            RouteClass::StaticAssets => match self.expires {
                Some(seconds) => writeln!(f, "        expires {}s;", seconds)?,
                None => writeln!(f, "        expires off;")?,
            },
            RouteClass::Default => {}
        }
        writeln!(f, "        proxy_pass http://{};", UPSTREAM)?;
        writeln!(f, "        proxy_http_version 1.1;")?;
        writeln!(f, "        proxy_set_header Connection \"\";")?;
        writeln!(f, "        proxy_set_header Host $host;")?;
        writeln!(f, "        proxy_set_header X-Real-IP $remote_addr;")?;
        writeln!(
            f,
            "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;"
        )?;
        writeln!(f, "        proxy_set_header X-Forwarded-Proto $scheme;")?;

        let timeouts = self.class.timeouts();
        writeln!(f, "        proxy_connect_timeout {}s;", timeouts.connect)?;
        writeln!(f, "        proxy_send_timeout {}s;", timeouts.send)?;
        writeln!(f, "        proxy_read_timeout {}s;", timeouts.read)?;
        writeln!(f, "    }}")
    }
}

impl Renderer for NginxRenderer {
    fn render(&self, config: &ConfigTree) -> Result<String, DeployError> {
        Ok(ProxyConfig::from_config(config).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults;
    use crate::domain::Env;
    use std::num::{NonZeroU32, NonZeroU64};

    fn config() -> ConfigTree {
        defaults(&Env::mock(Vec::<(&str, &str)>::new()))
    }

    fn render(config: &ConfigTree) -> String {
        NginxRenderer.render(config).unwrap()
    }

    #[test]
    fn test_gzip_disabled_has_no_compression() {
        let mut config = config();
        config.performance.compression.gzip = false;
        let out = render(&config);
        assert!(!out.contains("gzip"), "{}", out);
        assert!(!out.contains("brotli"), "{}", out);
    }

    #[test]
    fn test_brotli_flag_emits_no_module_directives() {
        // The stock nginx image has no brotli module
        let mut config = config();
        config.performance.compression.brotli = true;
        let out = render(&config);
        assert!(!out.contains("brotli"), "{}", out);
        assert!(out.contains("gzip on;"));
    }

    #[test]
    fn test_gzip_level_is_parameterized() {
        let mut config = config();
        config.performance.compression.gzip = true;
        config.performance.compression.level = 6;
        let out = render(&config);
        assert!(out.contains("gzip on;"));
        assert!(out.contains("gzip_comp_level 6;"));
    }

    #[test]
    fn test_rate_limit_zone() {
        let out = render(&config());
        // 100 requests per 15 minutes
        assert!(out.contains("zone=api_limit:10m rate=6r/m;"), "{}", out);

        let mut config = config();
        config.security.firewall.rate_limit.window_ms = NonZeroU64::new(60_000).unwrap();
        config.security.firewall.rate_limit.max_requests = NonZeroU32::new(250).unwrap();
        assert!(render(&config).contains("rate=250r/m;"));
    }

    #[test]
    fn test_tls_enabled_emits_redirect_and_tls_servers() {
        let out = render(&config());
        assert_eq!(out.matches("server {").count(), 2);
        assert!(out.contains("return 301 https://$host$request_uri;"));
        assert!(out.contains("listen 443 ssl http2;"));
        assert!(out.contains("ssl_certificate /etc/ssl/certs/server.crt;"));
        assert!(out.contains("ssl_protocols TLSv1.2 TLSv1.3;"));
    }

    #[test]
    fn test_tls_disabled_emits_single_plain_server() {
        let mut config = config();
        config.security.tls.enabled = false;
        let out = render(&config);
        assert_eq!(out.matches("server {").count(), 1);
        assert!(!out.contains("listen 443"));
        assert!(!out.contains("return 301"));
        assert!(out.contains("server_name example.com;"));
    }

    #[test]
    fn test_hsts_header_gated_on_flag() {
        let mut config = config();
        config.security.tls.hsts_max_age = 63_072_000;
        assert!(render(&config).contains("max-age=63072000; includeSubDomains"));

        config.security.tls.hsts = false;
        assert!(!render(&config).contains("Strict-Transport-Security"));
    }

    #[test]
    fn test_route_class_timeouts() {
        let out = render(&config());
        assert!(out.contains("location /api/ {"));
        assert!(out.contains("proxy_send_timeout 60s;"));
        assert!(out.contains("proxy_connect_timeout 10s;"));
        assert_eq!(out.matches("proxy_connect_timeout 5s;").count(), 2);
        assert!(out.contains("expires 3600s;"));
        assert!(out.contains("location = /health {"));
    }

    #[test]
    fn test_firewall_allow_list() {
        let mut config = config();
        config.security.firewall.allow_list = vec!["10.0.0.0/8".to_string()];
        let out = render(&config);
        assert!(out.contains("allow 10.0.0.0/8;"));
        assert!(out.contains("deny all;"));

        config.security.firewall.enabled = false;
        assert!(!render(&config).contains("deny all;"));
    }

    #[test]
    fn test_unrestricted_allow_list_entries_render_allow_all() {
        for sentinel in ["*", "0.0.0.0/0", "::/0"] {
            let mut config = config();
            config.security.firewall.allow_list =
                vec!["10.0.0.0/8".to_string(), sentinel.to_string()];
            let out = render(&config);

            assert!(out.contains("    allow all;"), "{}: {}", sentinel, out);
            assert!(!out.contains("deny all;"), "{}: {}", sentinel, out);
            assert!(!out.contains(&format!("allow {};", sentinel)), "{}", out);
            assert!(!out.contains("allow 10.0.0.0/8;"), "{}", out);
        }
    }
}
