macro_rules! prefix {
    ($type:literal) => {
        concat!("type.googleapis.com/", $type)
    };
}

pub const ENDPOINT: &str = prefix!("envoy.config.endpoint.v3.ClusterLoadAssignment");
pub const CLUSTER: &str = prefix!("envoy.config.cluster.v3.Cluster");
pub const ROUTE: &str = prefix!("envoy.config.route.v3.RouteConfiguration");
pub const VIRTUAL_HOST: &str = prefix!("envoy.config.route.v3.VirtualHost");
pub const LISTENER: &str = prefix!("envoy.config.listener.v3.Listener");
pub const SECRET: &str = prefix!("envoy.extensions.transport_sockets.tls.v3.Secret");
pub const RUNTIME: &str = prefix!("envoy.service.runtime.v3.Runtime");
pub const SCOPED_ROUTE: &str = prefix!("envoy.config.route.v3.ScopedRouteConfiguration");
pub const EXTENSION_CONFIG: &str = prefix!("envoy.config.core.v3.TypedExtensionConfig");

pub const ANY_TYPE: &str = "";

/// The core resource taxonomy: the fixed, ordered set of type URLs the
/// discovery server and snapshot cache know how to watch and fan out.
/// Other type URLs defined above (virtual host, secret, runtime, ...) are
/// part of the wider Envoy taxonomy but are not driven by this crate's
/// watch/cache machinery.
pub const CORE_TYPES: [&str; 4] = [CLUSTER, ENDPOINT, LISTENER, ROUTE];

/// Is `type_url` one of the four core resource types this control-plane
/// core understands?
pub fn is_core_type(type_url: &str) -> bool {
    CORE_TYPES.contains(&type_url)
}

pub fn shorten(type_url: &str) -> &str {
    if type_url.is_empty() {
        return "ADS";
    }
    type_url.split('.').last().unwrap_or(type_url)
}

pub fn priority(type_url: &str) -> u8 {
    match type_url {
        CLUSTER => 0,
        ENDPOINT => 1,
        LISTENER => 2,
        ROUTE => 3,
        VIRTUAL_HOST => 4,
        SECRET => 5,
        RUNTIME => 6,
        SCOPED_ROUTE => 7,
        EXTENSION_CONFIG => 8,
        _ => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_concatinates_valid_type() {
        assert_eq!(
            CLUSTER,
            "type.googleapis.com/envoy.config.cluster.v3.Cluster"
        )
    }
}
