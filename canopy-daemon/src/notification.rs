use canopy_data::WorktreeInfoSnapshot;

/// User-facing messages for a snapshot transition.
///
/// Only transitions of the same pull request count; a PR appearing,
/// disappearing or being replaced by another number says nothing.
pub fn transition_notifications(
    previous: &WorktreeInfoSnapshot,
    next: &WorktreeInfoSnapshot,
) -> Vec<String> {
    let (Some(number), Some(prev_number)) =
        (next.pull_request_number, previous.pull_request_number)
    else {
        return Vec::new();
    };
    if number != prev_number {
        return Vec::new();
    }

    let mut messages = Vec::new();

    let state = next.pull_request_state.as_deref();
    if state != previous.pull_request_state.as_deref() {
        match state {
            Some("MERGED") => messages.push(format!("Pull request #{} merged", number)),
            Some("CLOSED") => messages.push(format!("Pull request #{} closed", number)),
            _ => {}
        }
    }

    let review = next.pull_request_review_decision.as_deref();
    if review != previous.pull_request_review_decision.as_deref() {
        match review {
            Some("APPROVED") => messages.push(format!("Pull request #{} approved", number)),
            Some("CHANGES_REQUESTED") => {
                messages.push(format!("Changes requested on pull request #{}", number))
            }
            _ => {}
        }
    }

    if next.pull_request_mergeable == Some(false) && previous.pull_request_mergeable != Some(false)
    {
        messages.push(format!("Pull request #{} has merge conflicts", number));
    }

    messages
}
