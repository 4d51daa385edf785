use crate::inspector::target::TargetIdentifier;
use crate::protocol::key;
use log::debug;
use plist::{Dictionary, Value};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Names of all messages known by the bridge.
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, IntoStaticStr)]
pub enum MessageName {
    // --------------------------------- client to server ------------------------------------------
    #[strum(serialize = "WIRSocketSetupMessage")]
    SocketSetup,
    #[strum(serialize = "WIRSocketDataMessage")]
    SocketData,
    #[strum(serialize = "WIRWebPageCloseMessage")]
    WebPageClose,
    #[strum(serialize = "WIRApplicationGetListingMessage")]
    GetListing,

    // --------------------------------- server to client ------------------------------------------
    #[strum(serialize = "WIRListingMessage")]
    Listing,
    #[strum(serialize = "WIRRawDataMessage")]
    RawData,
}

/// Wrap a payload into the top level message dictionary.
pub fn envelope(name: MessageName, payload: Dictionary) -> Dictionary {
    let name: &'static str = name.into();
    let mut message = Dictionary::new();
    message.insert(key::MESSAGE_NAME.to_string(), Value::from(name));
    message.insert(key::MESSAGE_DATA.to_string(), Value::Dictionary(payload));
    message
}

/// Client request decoded from a top level message.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Setup {
        target: TargetIdentifier,
        connection: String,
        sender: String,
    },
    Data {
        target: TargetIdentifier,
        data: String,
    },
    Close {
        target: TargetIdentifier,
        connection: String,
    },
    GetListing,
}

impl Request {
    /// Decode a request from a top level message.
    ///
    /// Returns [`None`] for unknown or server-only message names and for messages with missing
    /// or mistyped fields. Such messages are dropped without any answer to the peer.
    pub fn parse(message: &Dictionary) -> Option<Self> {
        let Some(name) = message.get(key::MESSAGE_NAME).and_then(Value::as_string) else {
            debug!(target: "inspector", "drop message without name");
            return None;
        };
        let Ok(name) = name.parse::<MessageName>() else {
            debug!(target: "inspector", "drop unknown message {name}");
            return None;
        };
        let data = message.get(key::MESSAGE_DATA).and_then(Value::as_dictionary);

        let request = match name {
            MessageName::SocketSetup => data.and_then(|data| {
                Some(Request::Setup {
                    target: target_identifier(data)?,
                    connection: string(data, key::CONNECTION_IDENTIFIER)?,
                    sender: string(data, key::SENDER)?,
                })
            }),
            MessageName::SocketData => data.and_then(|data| {
                Some(Request::Data {
                    target: target_identifier(data)?,
                    data: string(data, key::SOCKET_DATA)?,
                })
            }),
            MessageName::WebPageClose => data.and_then(|data| {
                Some(Request::Close {
                    target: target_identifier(data)?,
                    connection: string(data, key::CONNECTION_IDENTIFIER)?,
                })
            }),
            MessageName::GetListing => Some(Request::GetListing),
            MessageName::Listing | MessageName::RawData => None,
        };

        if request.is_none() {
            debug!(target: "inspector", "drop incomplete {name} message");
        }
        request
    }
}

fn target_identifier(data: &Dictionary) -> Option<TargetIdentifier> {
    data.get(key::TARGET_IDENTIFIER)
        .and_then(Value::as_unsigned_integer)
        .and_then(|id| TargetIdentifier::try_from(id).ok())
}

fn string(data: &Dictionary, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_string).map(ToOwned::to_owned)
}

#[cfg(test)]
mod test {
    use crate::protocol::key;
    use crate::protocol::message::{envelope, MessageName, Request};
    use plist::{Dictionary, Value};

    fn data(fields: &[(&str, Value)]) -> Dictionary {
        let mut dict = Dictionary::new();
        for (k, v) in fields {
            dict.insert(k.to_string(), v.clone());
        }
        dict
    }

    #[test]
    fn test_message_names() {
        assert_eq!(
            "WIRSocketSetupMessage".parse::<MessageName>().unwrap(),
            MessageName::SocketSetup
        );
        assert_eq!(MessageName::Listing.to_string(), "WIRListingMessage");
        let raw: &'static str = MessageName::RawData.into();
        assert_eq!(raw, "WIRRawDataMessage");
    }

    #[test]
    fn test_parse_requests() {
        struct TestCase {
            name: MessageName,
            data: Dictionary,
            expected: Option<Request>,
        }

        let cases = [
            TestCase {
                name: MessageName::SocketSetup,
                data: data(&[
                    (key::TARGET_IDENTIFIER, Value::from(42u32)),
                    (key::CONNECTION_IDENTIFIER, Value::from("conn-1")),
                    (key::SENDER, Value::from("client")),
                ]),
                expected: Some(Request::Setup {
                    target: 42,
                    connection: "conn-1".to_string(),
                    sender: "client".to_string(),
                }),
            },
            TestCase {
                name: MessageName::SocketSetup,
                data: data(&[
                    (key::TARGET_IDENTIFIER, Value::from(42u32)),
                    (key::CONNECTION_IDENTIFIER, Value::from("conn-1")),
                ]),
                expected: None,
            },
            TestCase {
                name: MessageName::SocketData,
                data: data(&[
                    (key::TARGET_IDENTIFIER, Value::from(3u32)),
                    (key::SOCKET_DATA, Value::from("{}")),
                ]),
                expected: Some(Request::Data {
                    target: 3,
                    data: "{}".to_string(),
                }),
            },
            TestCase {
                name: MessageName::SocketData,
                data: data(&[
                    (key::TARGET_IDENTIFIER, Value::from("3")),
                    (key::SOCKET_DATA, Value::from("{}")),
                ]),
                expected: None,
            },
            TestCase {
                name: MessageName::WebPageClose,
                data: data(&[
                    (key::TARGET_IDENTIFIER, Value::from(3u32)),
                    (key::CONNECTION_IDENTIFIER, Value::from("c")),
                ]),
                expected: Some(Request::Close {
                    target: 3,
                    connection: "c".to_string(),
                }),
            },
            TestCase {
                name: MessageName::WebPageClose,
                data: data(&[
                    (key::TARGET_IDENTIFIER, Value::from(-1i64)),
                    (key::CONNECTION_IDENTIFIER, Value::from("c")),
                ]),
                expected: None,
            },
            TestCase {
                name: MessageName::GetListing,
                data: Dictionary::new(),
                expected: Some(Request::GetListing),
            },
            TestCase {
                name: MessageName::RawData,
                data: Dictionary::new(),
                expected: None,
            },
        ];

        for tc in cases {
            let message = envelope(tc.name, tc.data);
            assert_eq!(Request::parse(&message), tc.expected, "{}", tc.name);
        }
    }

    #[test]
    fn test_parse_broken_envelope() {
        assert_eq!(Request::parse(&Dictionary::new()), None);

        let unknown = data(&[(key::MESSAGE_NAME, Value::from("WIRSomethingElse"))]);
        assert_eq!(Request::parse(&unknown), None);

        let no_data = data(&[(key::MESSAGE_NAME, Value::from("WIRSocketDataMessage"))]);
        assert_eq!(Request::parse(&no_data), None);

        let listing_without_data = data(&[(
            key::MESSAGE_NAME,
            Value::from("WIRApplicationGetListingMessage"),
        )]);
        assert_eq!(
            Request::parse(&listing_without_data),
            Some(Request::GetListing)
        );
    }
}
