//! Parameterised name validation.

use rollcall_core::{CoreError, NameKind, ProtocolName, ServiceName};
use rstest::rstest;

#[rstest]
#[case("gabble")]
#[case("haze")]
#[case("a")]
#[case("Idle_2")]
#[case("sofiasip")]
fn valid_service_names(#[case] name: &str) {
    assert_eq!(ServiceName::new(name).expect("valid").as_str(), name);
}

#[rstest]
#[case("")]
#[case("2gabble")]
#[case("_gabble")]
#[case("gab-ble")]
#[case("gab ble")]
#[case("gäbble")]
#[case("org.freedesktop.gabble")]
fn invalid_service_names(#[case] name: &str) {
    let err = ServiceName::new(name).unwrap_err();
    assert!(
        matches!(err, CoreError::InvalidName { kind: NameKind::Service, .. }),
        "got: {err}"
    );
}

#[rstest]
#[case("jabber")]
#[case("local-xmpp")]
#[case("sip")]
#[case("X-2")]
fn valid_protocol_names(#[case] name: &str) {
    assert!(ProtocolName::new(name).is_ok());
}

#[rstest]
#[case("")]
#[case("-jabber")]
#[case("9p")]
#[case("local_xmpp")]
#[case("jab.ber")]
fn invalid_protocol_names(#[case] name: &str) {
    let err = ProtocolName::new(name).unwrap_err();
    assert!(
        matches!(err, CoreError::InvalidName { kind: NameKind::Protocol, .. }),
        "got: {err}"
    );
}
