mod chat;
mod pet_match;
mod profiles;
mod session;

pub use chat::{ChatUseCase, OpenChat};
pub use pet_match::PetMatchUseCase;
pub use profiles::{multipart_fields, Profile, ProfilesUseCase};
pub use session::SessionUseCase;
