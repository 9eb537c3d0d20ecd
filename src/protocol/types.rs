//! Message type tags

use std::fmt;

/// Every record on the wire carries one of these tags in its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Challenge-response: principal announces its identity
    ChapInitial,
    /// Challenge-response: authority issues a random challenge
    ChapChallenge,
    /// Challenge-response: digest over challenge and secret
    ChapResponse,
    /// Challenge-response: authentication verdict
    ChapResult,

    /// Ticket-granting: principal asks for a ticket to a service
    TicketRequest,
    /// Ticket-granting: ticket plus session key envelope
    TicketResponse,
    /// Ticket-granting: request refused
    TicketError,

    /// Service handshake: ticket and client nonce
    ClientHello,
    /// Service handshake: encrypted echo of the peer nonce plus a fresh nonce
    HandshakeResponse,

    /// Sealed application payload
    ServiceMessage,
}

impl MessageType {
    /// All known tags, in protocol order.
    pub const ALL: [Self; 10] = [
        Self::ChapInitial,
        Self::ChapChallenge,
        Self::ChapResponse,
        Self::ChapResult,
        Self::TicketRequest,
        Self::TicketResponse,
        Self::TicketError,
        Self::ClientHello,
        Self::HandshakeResponse,
        Self::ServiceMessage,
    ];

    /// The string stored in the record's `type` field.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::ChapInitial => "RFC1994 Initial",
            Self::ChapChallenge => "RFC1994 Challenge",
            Self::ChapResponse => "RFC1994 Response",
            Self::ChapResult => "RFC1994 Result",
            Self::TicketRequest => "Ticket Request",
            Self::TicketResponse => "Ticket Response",
            Self::TicketError => "Ticket Error",
            Self::ClientHello => "Client Hello",
            Self::HandshakeResponse => "Handshake Challenge Response",
            Self::ServiceMessage => "Service Message",
        }
    }

    /// Look a tag up.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.tag() == tag)
    }

    /// Whether the message belongs to the challenge-response exchange
    #[must_use]
    pub const fn is_chap(self) -> bool {
        matches!(
            self,
            Self::ChapInitial | Self::ChapChallenge | Self::ChapResponse | Self::ChapResult
        )
    }

    /// Whether the message belongs to the ticket-granting exchange
    #[must_use]
    pub const fn is_ticket(self) -> bool {
        matches!(
            self,
            Self::TicketRequest | Self::TicketResponse | Self::TicketError
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup() {
        for ty in MessageType::ALL {
            assert_eq!(MessageType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(MessageType::from_tag("RFC1994 Bogus"), None);
        assert_eq!(MessageType::from_tag(""), None);
    }

    #[test]
    fn test_tag_is_case_sensitive() {
        assert_eq!(MessageType::from_tag("client hello"), None);
        assert_eq!(
            MessageType::from_tag("Client Hello"),
            Some(MessageType::ClientHello)
        );
    }

    #[test]
    fn test_message_families() {
        assert!(MessageType::ChapResult.is_chap());
        assert!(!MessageType::ChapResult.is_ticket());
        assert!(MessageType::TicketError.is_ticket());
        assert!(!MessageType::ClientHello.is_chap());
        assert_eq!(MessageType::HandshakeResponse.to_string(), "Handshake Challenge Response");
    }
}
