//! Additional session-URI coverage beyond what is inline-tested in
//! `src/uri.rs`: trailing-slash authorities, lone-user userinfo, and the
//! `verifyhostcert`/`accepthostname` query parameters.

use x3270sh::uri::SessionUri;

#[test]
fn trailing_slash_after_authority_is_ignored() {
    let uri = SessionUri::parse("telnet://host.example.com:2323/").unwrap();
    assert_eq!(uri.host, "host.example.com");
    assert_eq!(uri.port, 2323);
}

#[test]
fn userinfo_without_password_sets_user_only() {
    let uri = SessionUri::parse("telnet://user@host:2323").unwrap();
    assert_eq!(uri.user.as_deref(), Some("user"));
    assert_eq!(uri.password, None);
}

#[test]
fn verify_host_cert_defaults_true_and_accepts_explicit_false() {
    let default_uri = SessionUri::parse("tn3270s://host").unwrap();
    assert!(default_uri.verify_host_cert);

    let insecure_uri = SessionUri::parse("tn3270s://host?verifyhostcert=false").unwrap();
    assert!(!insecure_uri.verify_host_cert);
}

#[test]
fn accept_hostname_query_parameter_is_captured() {
    let uri = SessionUri::parse("tn3270s://host?accepthostname=alt.example.com").unwrap();
    assert_eq!(uri.accept_hostname.as_deref(), Some("alt.example.com"));
}

#[test]
fn empty_authority_is_rejected() {
    assert!(SessionUri::parse("telnet://").is_err());
}

#[test]
fn unknown_query_keys_are_ignored_without_error() {
    let uri = SessionUri::parse("telnet://host?bogus=1&lu=LU1").unwrap();
    assert_eq!(uri.lu_names, vec!["LU1".to_string()]);
}
