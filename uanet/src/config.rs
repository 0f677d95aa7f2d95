/// Buffer limits of one side of a connection.
///
/// Each connection carries two of these: the local configuration the
/// adapter was built with, and the remote one the peer advertised during
/// the protocol handshake (filled in by the protocol layer through
/// [`Connection::set_remote_config`](crate::Connection::set_remote_config)).
///
/// Only the two buffer sizes are interpreted by the network layer:
/// `recv_buffer_size` sizes every receive, and the peer's
/// `recv_buffer_size` bounds send buffer requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Protocol version announced in the handshake.
    pub protocol_version: u32,

    /// Largest chunk this side accepts in one receive.
    pub recv_buffer_size: u32,

    /// Largest chunk this side sends.
    pub send_buffer_size: u32,

    /// Largest reassembled message, `0` for no limit.
    pub max_message_size: u32,

    /// Largest number of chunks per message, `0` for no limit.
    pub max_chunk_count: u32,
}

impl ConnectionConfig {
    /// The standard configuration: protocol version 0, 64 KiB buffers
    /// and no message or chunk limits.
    pub const STANDARD: Self = Self {
        protocol_version: 0,
        recv_buffer_size: 65535,
        send_buffer_size: 65535,
        max_message_size: 0,
        max_chunk_count: 0,
    };
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}
