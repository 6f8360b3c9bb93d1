//! DCC request parsing.
//!
//! `DCC SEND <filename> <ip> <port> <size>` and
//! `DCC ACCEPT <filename> <port> <position>`. The IP is a decimal 32-bit
//! integer in network byte order.

use std::net::Ipv4Addr;
use std::str::FromStr;

use super::DccError;
use crate::irc::{Ctcp, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOffer {
    /// As sent by the peer, not yet sanitized.
    pub filename: String,
    pub addr: Ipv4Addr,
    pub port: u16,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptOffer {
    pub filename: String,
    pub port: u16,
    pub position: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    Send(SendOffer),
    Accept(AcceptOffer),
}

impl Offer {
    pub fn from_message(msg: &Message) -> Result<Self, DccError> {
        Self::parse(msg.dcc().ok_or(DccError::NotDcc)?)
    }

    pub fn parse(dcc: &Ctcp) -> Result<Self, DccError> {
        let params = &dcc.params;
        match dcc.command.to_ascii_uppercase().as_str() {
            "SEND" => {
                let [filename, ip, port, size, ..] = params.as_slice() else {
                    return Err(malformed("SEND", "expected filename, address, port and size"));
                };
                let addr = Ipv4Addr::from(number::<u32>("SEND", "address", ip)?);
                let port = number::<u16>("SEND", "port", port)?;
                if port == 0 {
                    return Err(malformed("SEND", "passive transfers are not supported"));
                }
                Ok(Self::Send(SendOffer {
                    filename: filename.clone(),
                    addr,
                    port,
                    size: number("SEND", "size", size)?,
                }))
            }
            "ACCEPT" => {
                let [filename, port, position, ..] = params.as_slice() else {
                    return Err(malformed("ACCEPT", "expected filename, port and position"));
                };
                Ok(Self::Accept(AcceptOffer {
                    filename: filename.clone(),
                    port: number("ACCEPT", "port", port)?,
                    position: number("ACCEPT", "position", position)?,
                }))
            }
            _ => Err(DccError::Unsupported(dcc.command.clone())),
        }
    }
}

/// The CTCP body asking `peer` to continue a SEND from `position`.
pub fn resume_request(filename: &str, port: u16, position: u64) -> String {
    let filename = if filename.contains(' ') {
        format!("\"{filename}\"")
    } else {
        filename.to_string()
    };
    format!("\x01DCC RESUME {filename} {port} {position}\x01")
}

fn number<T: FromStr>(command: &'static str, field: &str, text: &str) -> Result<T, DccError> {
    text.parse()
        .map_err(|_| malformed(command, &format!("bad {field} {text:?}")))
}

fn malformed(command: &'static str, reason: &str) -> DccError {
    DccError::Malformed {
        command,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(line: &str) -> Result<Offer, DccError> {
        Offer::from_message(&Message::parse(line).unwrap())
    }

    #[test]
    fn parses_send_with_packed_address() {
        let parsed = offer(":bot!u@h PRIVMSG me :\x01DCC SEND \"a file.bin\" 3232235777 5000 1024\x01")
            .unwrap();
        assert_eq!(
            parsed,
            Offer::Send(SendOffer {
                filename: "a file.bin".into(),
                addr: Ipv4Addr::new(192, 168, 1, 1),
                port: 5000,
                size: 1024,
            })
        );

        let Offer::Send(send) = offer(":b PRIVMSG me :\x01DCC SEND f 2130706433 1 0\x01").unwrap()
        else {
            panic!("expected SEND");
        };
        assert_eq!(send.addr, Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn parses_accept() {
        let parsed = offer(":bot PRIVMSG me :\x01DCC ACCEPT file.bin 5000 512\x01").unwrap();
        assert_eq!(
            parsed,
            Offer::Accept(AcceptOffer {
                filename: "file.bin".into(),
                port: 5000,
                position: 512,
            })
        );
    }

    #[test]
    fn rejects_bad_requests() {
        assert!(matches!(
            offer(":b PRIVMSG me :\x01DCC CHAT chat 1 2\x01"),
            Err(DccError::Unsupported(cmd)) if cmd == "CHAT"
        ));
        assert!(matches!(
            offer(":b PRIVMSG me :\x01DCC SEND f 1 2\x01"),
            Err(DccError::Malformed { .. })
        ));
        assert!(matches!(
            offer(":b PRIVMSG me :\x01DCC SEND f notanip 2 3\x01"),
            Err(DccError::Malformed { .. })
        ));
        assert!(matches!(
            offer(":b PRIVMSG me :\x01DCC SEND f 2130706433 0 3 token\x01"),
            Err(DccError::Malformed { .. })
        ));
        assert!(matches!(
            offer(":b PRIVMSG me :hello"),
            Err(DccError::NotDcc)
        ));
    }

    #[test]
    fn resume_request_quotes_spaces() {
        assert_eq!(
            resume_request("file.bin", 5000, 42),
            "\x01DCC RESUME file.bin 5000 42\x01"
        );
        assert_eq!(
            resume_request("a b.bin", 5000, 42),
            "\x01DCC RESUME \"a b.bin\" 5000 42\x01"
        );
    }
}
