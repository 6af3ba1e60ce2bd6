use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

use crate::Result;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Apply an optional proxy to a `reqwest::ClientBuilder`.
///
/// - `None` => no proxy at all, environment proxies included
/// - `Some(url)` => route every request through `url`; credentials may be
///   embedded in the URL
/// - an unparsable URL is logged and treated like `None`
pub fn apply_proxy(builder: reqwest::ClientBuilder, proxy: Option<&str>) -> reqwest::ClientBuilder {
    let Some(url) = proxy else {
        return builder.no_proxy();
    };

    match reqwest::Proxy::all(url) {
        Ok(proxy) => builder.proxy(proxy),
        Err(error) => {
            warn!(
                proxy_url = %url,
                error = %error,
                "Invalid proxy URL; disabling proxy"
            );
            builder.no_proxy()
        }
    }
}

/// Build the client used for catalog requests through `proxy`.
pub fn build_catalog_client(
    proxy: Option<&str>,
    request_timeout: Duration,
) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .gzip(true)
        .deflate(true)
        .pool_max_idle_per_host(4);

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder = apply_proxy(builder, proxy);
    Ok(builder.build()?)
}
