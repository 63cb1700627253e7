mod handshake;

pub use handshake::{
    AuthSwitchRequest, CachingSha2PasswordFastAuthResult, HandshakeResponse41, InitialHandshake,
    auth_caching_sha2_password, auth_mysql_native_password, read_auth_switch_request,
    read_caching_sha2_password_fast_auth_result, read_initial_handshake,
    write_auth_switch_response, write_handshake_response,
};
