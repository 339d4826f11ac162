mod api;

pub use api::{
    Address, CreateUserRequest, DEFAULT_PAGE_SIZE, DateQuery, DateResponse, ERROR_KINDS,
    ErrorKindPath, HealthResponse, ListUsersQuery, MAX_PAGE_SIZE, USER_ROLES, UserListResponse,
    UserPath, UserResponse,
};
