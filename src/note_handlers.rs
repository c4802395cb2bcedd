use crate::error::ApiError;
use crate::models::{timestamp, ApiResponse, Note, UserDocument};
use crate::state::Caller;

fn no_data() -> ApiResponse {
    ApiResponse::fail("No data specified.")
}

/// Client IP to stamp on a note, if the server is configured to keep it.
fn stamp_ip(caller: &Caller) -> Option<String> {
    caller.settings().server.store_ip.then(|| caller.ip_key())
}

pub fn get_notes(doc: UserDocument) -> ApiResponse {
    ApiResponse {
        success: true,
        notes: Some(doc.notes),
        ..ApiResponse::default()
    }
}

pub fn add_note(caller: &Caller, mut doc: UserDocument) -> Result<ApiResponse, ApiError> {
    if caller.request.data.is_none() {
        return Ok(no_data());
    }
    let input = caller.request.note_input();
    if input.title.is_empty() || input.content.is_empty() {
        return Ok(ApiResponse::fail("Title and content are required."));
    }

    let now = timestamp();
    let ip = stamp_ip(caller);
    let note = Note {
        id: uuid::Uuid::new_v4().simple().to_string(),
        title: input.title,
        content: input.content,
        created_at: now.clone(),
        updated_at: now,
        created_ip: ip.clone(),
        updated_ip: ip,
    };
    doc.notes.push(note.clone());
    caller.state.store.save(&doc)?;

    Ok(ApiResponse {
        note: Some(note),
        ..ApiResponse::ok("Note added successfully.")
    })
}

pub fn update_note(caller: &Caller, mut doc: UserDocument) -> Result<ApiResponse, ApiError> {
    if caller.request.data.is_none() {
        return Ok(no_data());
    }
    let input = caller.request.note_input();
    if input.id.is_empty() || input.title.is_empty() || input.content.is_empty() {
        return Ok(ApiResponse::fail("Note ID, title and content are required."));
    }

    let ip = stamp_ip(caller);
    let Some(note) = doc.find_note_mut(&input.id) else {
        return Ok(ApiResponse::fail("Note not found."));
    };
    note.title = input.title;
    note.content = input.content;
    note.updated_at = timestamp();
    if ip.is_some() {
        note.updated_ip = ip;
    }
    caller.state.store.save(&doc)?;

    Ok(ApiResponse::ok("Note updated successfully."))
}

pub fn delete_note(caller: &Caller, mut doc: UserDocument) -> Result<ApiResponse, ApiError> {
    if caller.request.data.is_none() {
        return Ok(no_data());
    }
    let input = caller.request.note_input();
    if input.id.is_empty() {
        return Ok(ApiResponse::fail("Note ID is required."));
    }
    if !doc.remove_note(&input.id) {
        return Ok(ApiResponse::fail("Note not found."));
    }
    caller.state.store.save(&doc)?;

    Ok(ApiResponse::ok("Note deleted successfully."))
}
