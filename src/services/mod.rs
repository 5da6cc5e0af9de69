pub mod address_service;
pub mod dispatch_service;
pub mod history_service;
pub mod stager;
