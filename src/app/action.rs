use crate::irc::Message;

/// Side effects requested by the handlers, carried out by the application.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A raw line for the server, without its terminator.
    Send(String),
    Connect,
    /// Hand a DCC offer to the transfer engine.
    DccOffer(Message),
    /// Leave: close the connection if there is one, then stop.
    Quit { reason: Option<String> },
}
