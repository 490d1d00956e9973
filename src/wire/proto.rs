//! Protobuf representation of [ProtocolMessage][crate::messages::ProtocolMessage].
//!
//! Fixed-size values (addresses, hashes, signatures, identity keys, 256 bit
//! integers) are carried as big-endian `bytes`.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub protocol: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub process_id: ::prost::alloc::vec::Vec<u8>,
    #[prost(sint32, tag = "3")]
    pub seq: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub to_identity_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub signature: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub signature2: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(oneof = "envelope::Params", tags = "7, 8, 9, 10, 11, 12")]
    pub params: ::core::option::Option<envelope::Params>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Params {
        #[prost(message, tag = "7")]
        Setup(super::SetupParamsMsg),
        #[prost(message, tag = "8")]
        Propose(super::ProposeParamsMsg),
        #[prost(message, tag = "9")]
        Install(super::InstallParamsMsg),
        #[prost(message, tag = "10")]
        Uninstall(super::UninstallParamsMsg),
        #[prost(message, tag = "11")]
        TakeAction(super::TakeActionParamsMsg),
        #[prost(message, tag = "12")]
        Update(super::UpdateParamsMsg),
    }
}

/// Fields every params message starts with.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelRef {
    #[prost(bytes = "vec", tag = "1")]
    pub multisig_address: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub initiator_identifier: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub responder_identifier: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetupParamsMsg {
    #[prost(message, optional, tag = "1")]
    pub channel: ::core::option::Option<ChannelRef>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProposeParamsMsg {
    #[prost(message, optional, tag = "1")]
    pub channel: ::core::option::Option<ChannelRef>,
    #[prost(bytes = "vec", tag = "2")]
    pub app_definition: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "3")]
    pub state_encoding: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "4")]
    pub action_encoding: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(bytes = "vec", tag = "5")]
    pub initial_state: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "6")]
    pub outcome_type: u32,
    #[prost(bytes = "vec", tag = "7")]
    pub initiator_deposit: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub initiator_deposit_token: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "9")]
    pub responder_deposit: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "10")]
    pub responder_deposit_token: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "11")]
    pub default_timeout: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "12")]
    pub state_timeout: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstallParamsMsg {
    #[prost(message, optional, tag = "1")]
    pub channel: ::core::option::Option<ChannelRef>,
    #[prost(bytes = "vec", tag = "2")]
    pub identity_hash: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UninstallParamsMsg {
    #[prost(message, optional, tag = "1")]
    pub channel: ::core::option::Option<ChannelRef>,
    #[prost(bytes = "vec", tag = "2")]
    pub identity_hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub action: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TakeActionParamsMsg {
    #[prost(message, optional, tag = "1")]
    pub channel: ::core::option::Option<ChannelRef>,
    #[prost(bytes = "vec", tag = "2")]
    pub identity_hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub action: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub state_timeout: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateParamsMsg {
    #[prost(message, optional, tag = "1")]
    pub channel: ::core::option::Option<ChannelRef>,
    #[prost(bytes = "vec", tag = "2")]
    pub identity_hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub new_state: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub state_timeout: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}
