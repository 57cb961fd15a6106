use std::fmt;

use thiserror::Error;

/// Status codes a broker RPC may fail with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcCode {
	/// Resource does not exist
	NotFound,
	/// Resource already exists (lost a creation race)
	AlreadyExists,
	/// Caller lacks permission
	PermissionDenied,
	/// Broker temporarily unreachable
	Unavailable,
	/// RPC did not complete in time
	DeadlineExceeded,
	/// Request rejected as malformed
	InvalidArgument,
	/// Broker-side failure
	Internal,
	/// Anything else
	Unknown,
}

impl fmt::Display for RpcCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let code = match self {
			| RpcCode::NotFound => "NOT_FOUND",
			| RpcCode::AlreadyExists => "ALREADY_EXISTS",
			| RpcCode::PermissionDenied => "PERMISSION_DENIED",
			| RpcCode::Unavailable => "UNAVAILABLE",
			| RpcCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
			| RpcCode::InvalidArgument => "INVALID_ARGUMENT",
			| RpcCode::Internal => "INTERNAL",
			| RpcCode::Unknown => "UNKNOWN",
		};
		f.write_str(code)
	}
}

/// Errors reported by a [`BrokerGateway`](super::BrokerGateway)
#[derive(Debug, Error)]
pub enum BrokerError {
	/// The broker answered an RPC with a failure status
	#[error("broker rpc failed ({code}): {message}")]
	Rpc {
		/// Status code
		code: RpcCode,
		/// Broker-provided detail
		message: String,
	},

	/// The transport below the broker client failed
	#[error("broker transport failed: {0}")]
	Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

	/// The gateway connection was already released
	#[error("broker connection is closed")]
	ConnectionClosed,
}

impl BrokerError {
	/// Creates an RPC failure
	pub fn rpc(code: RpcCode, message: impl Into<String>) -> Self {
		Self::Rpc {
			code,
			message: message.into(),
		}
	}

	/// Creates a transport failure from a plain description
	pub fn transport(message: impl Into<String>) -> Self {
		Self::Transport(message.into().into())
	}

	/// Returns the RPC status code, if this is an RPC failure
	pub fn code(&self) -> Option<RpcCode> {
		match self {
			| BrokerError::Rpc { code, .. } => Some(*code),
			| _ => None,
		}
	}

	/// True when a create call lost a race against another creator
	pub fn is_already_exists(&self) -> bool {
		self.code() == Some(RpcCode::AlreadyExists)
	}
}
