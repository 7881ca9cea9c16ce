//! Integration-level sanity checks for the bind-spec grammar (§8 I7): a
//! resolved spec must be usable to actually bind a socket, not just parse.

use x3270sh::bind::BindSpec;

#[test]
fn named_host_resolves_through_the_system_resolver() {
    let spec = BindSpec::parse("localhost:18731").unwrap();
    let addr = spec.resolve().unwrap();
    assert!(addr.ip().is_loopback());
    assert_eq!(addr.port(), 18731);
}

#[tokio::test]
async fn resolved_wildcard_spec_binds_successfully() {
    let spec = BindSpec::parse("*:18732").unwrap();
    assert_eq!(spec.host, "0.0.0.0");
    let addr = spec.resolve().unwrap();
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    assert_eq!(listener.local_addr().unwrap().port(), 18732);
}

#[tokio::test]
async fn bracketed_ipv6_wildcard_resolves_and_binds() {
    let spec = BindSpec::parse("[::]:18733").unwrap();
    assert_eq!(spec.host, "::");
    let addr = spec.resolve().unwrap();
    assert!(addr.is_ipv6());
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => assert_eq!(listener.local_addr().unwrap().port(), 18733),
        Err(e) => {
            // IPv6 may be unavailable in some CI sandboxes; don't fail the
            // suite over environment limitations the grammar doesn't govern.
            eprintln!("skipping IPv6 bind check: {e}");
        }
    }
}
