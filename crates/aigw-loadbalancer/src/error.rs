use aigw_core::Strng;

#[derive(Debug, thiserror::Error)]
pub enum LoadBalancerError {
	#[error("backend {0} has no resolved endpoints")]
	NoEndpoints(aigw_config::BackendId),
	#[error("backend {0} does not serve model {1:?}")]
	ModelNotFound(aigw_config::BackendId, Strng),
}

impl LoadBalancerError {
	pub fn status_code(&self) -> u16 {
		match self {
			LoadBalancerError::NoEndpoints(_) => 503,
			LoadBalancerError::ModelNotFound(..) => 404,
		}
	}
}
