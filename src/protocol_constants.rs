pub const CRLF: &str = "\r\n";
pub const SIMPLE_STRING_PREFIX: &str = "+";
pub const ERROR_PREFIX: &str = "-";
pub const INTEGER_PREFIX: &str = ":";
pub const BULK_STRING_PREFIX: &str = "$";
pub const ARRAY_PREFIX: &str = "*";

pub const PING_COMMAND: &str = "PING";
pub const ECHO_COMMAND: &str = "ECHO";
pub const GET_COMMAND: &str = "GET";
pub const SET_COMMAND: &str = "SET";
pub const CONFIG_COMMAND: &str = "CONFIG";
pub const KEYS_COMMAND: &str = "KEYS";
pub const INFO_COMMAND: &str = "INFO";
pub const REPLCONF_COMMAND: &str = "REPLCONF";
pub const PSYNC_COMMAND: &str = "PSYNC";

pub const NX_OPTION: &str = "NX";
pub const XX_OPTION: &str = "XX";
pub const EX_OPTION: &str = "EX";
pub const PX_OPTION: &str = "PX";

pub const CONFIG_GET_OPTION: &str = "GET";
pub const LISTENING_PORT_OPTION: &str = "listening-port";
pub const CAPA_OPTION: &str = "capa";
pub const REPLICATION_SECTION: &str = "replication";

pub const PONG_RESPONSE: &str = "PONG";
pub const OK_RESPONSE: &str = "OK";
pub const FULLRESYNC_RESPONSE: &str = "FULLRESYNC";

pub const ROLE_MASTER: &str = "master";
pub const ROLE_SLAVE: &str = "slave";

pub const MAGIC_NUMBER: &[u8] = b"REDIS";
pub const OPCODE_AUX: u8 = 0xFA;
pub const OPCODE_RESIZE_DB: u8 = 0xFB;
pub const OPCODE_EXPIRE_TIME_MS: u8 = 0xFC;
pub const OPCODE_EXPIRE_TIME_S: u8 = 0xFD;
pub const OPCODE_SELECT_DB: u8 = 0xFE;
pub const OPCODE_EOF: u8 = 0xFF;
pub const VALUE_TYPE_STRING: u8 = 0x00;

pub const STRING_ENC_INT8: u8 = 0;
pub const STRING_ENC_INT16: u8 = 1;
pub const STRING_ENC_INT32: u8 = 2;
pub const STRING_ENC_LZF: u8 = 3;

// Depth of each connection's outbound frame queue. A replica that falls this
// far behind starts losing propagated frames rather than stalling the
// dispatcher.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

// Snapshot of an empty keyspace as written by redis 7.2.0, served to a
// replica when no RDB file exists on disk.
pub const EMPTY_RDB: &[u8] = &[
    0x52, 0x45, 0x44, 0x49, 0x53, 0x30, 0x30, 0x31, 0x31, // REDIS0011
    0xFA, 0x09, 0x72, 0x65, 0x64, 0x69, 0x73, 0x2D, 0x76, 0x65, 0x72, // redis-ver
    0x05, 0x37, 0x2E, 0x32, 0x2E, 0x30, // 7.2.0
    0xFA, 0x0A, 0x72, 0x65, 0x64, 0x69, 0x73, 0x2D, 0x62, 0x69, 0x74, 0x73, // redis-bits
    0xC0, 0x40, // 64
    0xFA, 0x05, 0x63, 0x74, 0x69, 0x6D, 0x65, // ctime
    0xC2, 0x6D, 0x08, 0xBC, 0x65,
    0xFA, 0x08, 0x75, 0x73, 0x65, 0x64, 0x2D, 0x6D, 0x65, 0x6D, // used-mem
    0xC2, 0xB0, 0xC4, 0x10, 0x00,
    0xFA, 0x08, 0x61, 0x6F, 0x66, 0x2D, 0x62, 0x61, 0x73, 0x65, // aof-base
    0xC0, 0x00,
    0xFF, // EOF
    0xF0, 0x6E, 0x3B, 0xFE, 0xC0, 0xFF, 0x5A, 0xA2, // checksum
];
