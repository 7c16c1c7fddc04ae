/// 물품 컬럼 목록
pub const ITEM_COLUMNS: &str = "id, name, category, condition, description, price, city, area, pickup_locations, owner_id, status, reserved_by_user_id, reserved_until, reserved_reason, pickup_approved_at, carousel_exit_notified, sold_to, sold_at, date_added";

/// 다음 물품 id 조회 (삭제된 물품 포함, 재사용 방지)
pub const NEXT_ITEM_ID: &str =
    "SELECT COALESCE(MAX(id::BIGINT), 0) + 1 AS next_id FROM items WHERE id ~ '^[0-9]+$'";

/// 물품 등록 (id 충돌 시 아무것도 하지 않음)
pub const INSERT_ITEM: &str = r#"
    INSERT INTO items (id, name, category, condition, description, price, city, area, pickup_locations, owner_id, status, carousel_exit_notified, date_added)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'available', FALSE, $11)
    ON CONFLICT (id) DO NOTHING
    RETURNING id, name, category, condition, description, price, city, area, pickup_locations, owner_id, status, reserved_by_user_id, reserved_until, reserved_reason, pickup_approved_at, carousel_exit_notified, sold_to, sold_at, date_added
"#;

/// 물품 조회
pub const GET_ITEM: &str = r#"
    SELECT id, name, category, condition, description, price, city, area, pickup_locations, owner_id, status, reserved_by_user_id, reserved_until, reserved_reason, pickup_approved_at, carousel_exit_notified, sold_to, sold_at, date_added
    FROM items
    WHERE id = $1 AND deleted_at IS NULL
"#;

/// 만료 예약 일괄 해제
/// 잠긴 행은 건너뛰고, 이 문장이 실제로 해제한 행의 이전 예약자를 반환한다.
pub const CLEAR_EXPIRED_RESERVATIONS: &str = r#"
    WITH expired AS (
        SELECT pk, reserved_by_user_id, reserved_reason
        FROM items
        WHERE status = 'reserved' AND reserved_until < $1 AND deleted_at IS NULL
        FOR UPDATE SKIP LOCKED
    )
    UPDATE items AS i
    SET status = 'available',
        reserved_by_user_id = NULL,
        reserved_until = NULL,
        reserved_reason = NULL,
        pickup_approved_at = NULL
    FROM expired AS e
    WHERE i.pk = e.pk
    RETURNING i.id, e.reserved_by_user_id, e.reserved_reason
"#;

/// 상태 필드가 없는 물품 정규화
pub const NORMALIZE_MISSING_STATUS: &str = r#"
    UPDATE items
    SET status = 'available',
        reserved_by_user_id = NULL,
        reserved_until = NULL,
        reserved_reason = NULL,
        pickup_approved_at = NULL
    WHERE status IS NULL
"#;

/// 캐러셀 종료 알림 대상
pub const GET_CAROUSEL_EXIT_CANDIDATES: &str = r#"
    SELECT id, name, category, condition, description, price, city, area, pickup_locations, owner_id, status, reserved_by_user_id, reserved_until, reserved_reason, pickup_approved_at, carousel_exit_notified, sold_to, sold_at, date_added
    FROM items
    WHERE deleted_at IS NULL
      AND carousel_exit_notified = FALSE
      AND owner_id IS NOT NULL
      AND date_added > $1
      AND date_added <= $2
"#;

/// 캐러셀 종료 알림 플래그 (한 번만)
pub const MARK_CAROUSEL_EXIT_NOTIFIED: &str = r#"
    UPDATE items
    SET carousel_exit_notified = TRUE, carousel_exit_notified_at = $2
    WHERE id = $1 AND carousel_exit_notified = FALSE
"#;

/// 물품 소프트 삭제
pub const SOFT_DELETE_ITEM: &str =
    "UPDATE items SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL";

/// 승인 요청 생성 (이미 있으면 아무것도 하지 않음)
pub const INSERT_APPROVAL: &str = r#"
    INSERT INTO item_approvals (item_id, buyer_id, seller_id, status, created_at, updated_at)
    VALUES ($1, $2, $3, 'pending', $4, $4)
    ON CONFLICT (item_id, buyer_id, seller_id) DO NOTHING
    RETURNING id, item_id, buyer_id, seller_id, status, created_at, updated_at, hold_placed_at
"#;

/// 승인 요청 조회 (item, buyer, seller)
pub const GET_APPROVAL: &str = r#"
    SELECT id, item_id, buyer_id, seller_id, status, created_at, updated_at, hold_placed_at
    FROM item_approvals
    WHERE item_id = $1 AND buyer_id = $2 AND seller_id = $3
"#;

/// 승인 상태 upsert
pub const UPSERT_APPROVAL_STATUS: &str = r#"
    INSERT INTO item_approvals (item_id, buyer_id, seller_id, status, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $5)
    ON CONFLICT (item_id, buyer_id, seller_id)
    DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at, hold_placed_at = NULL
    RETURNING id, item_id, buyer_id, seller_id, status, created_at, updated_at, hold_placed_at
"#;

/// 판매자의 물품별 승인 요청 목록
pub const GET_APPROVALS_BY_SELLER: &str = r#"
    SELECT id, item_id, buyer_id, seller_id, status, created_at, updated_at, hold_placed_at
    FROM item_approvals
    WHERE item_id = $1 AND seller_id = $2
    ORDER BY created_at ASC
"#;

/// 구매자의 승인 요청
pub const GET_APPROVAL_BY_BUYER: &str = r#"
    SELECT id, item_id, buyer_id, seller_id, status, created_at, updated_at, hold_placed_at
    FROM item_approvals
    WHERE item_id = $1 AND buyer_id = $2
    ORDER BY updated_at DESC
    LIMIT 1
"#;

/// 물품 예약 완료 기록
pub const MARK_APPROVAL_HOLD_PLACED: &str =
    "UPDATE item_approvals SET hold_placed_at = $2 WHERE id = $1 AND status = 'approved'";

/// 예약이 확인되지 않은 승인 목록
pub const GET_UNCONFIRMED_APPROVALS: &str = r#"
    SELECT id, item_id, buyer_id, seller_id, status, created_at, updated_at, hold_placed_at
    FROM item_approvals
    WHERE status = 'approved' AND hold_placed_at IS NULL AND updated_at <= $1
    ORDER BY updated_at ASC
"#;

/// 미확인 승인 되돌리기
pub const REVERT_UNCONFIRMED_APPROVAL: &str = r#"
    UPDATE item_approvals
    SET status = 'pending', updated_at = $2
    WHERE id = $1 AND status = 'approved' AND hold_placed_at IS NULL
"#;

/// 채팅방 생성 (이미 있으면 아무것도 하지 않음)
pub const INSERT_CHAT: &str = r#"
    INSERT INTO chats (item_id, buyer_id, seller_id, is_approved, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $5)
    ON CONFLICT (item_id, buyer_id, seller_id) DO NOTHING
    RETURNING id, item_id, buyer_id, seller_id, is_approved, created_at, updated_at
"#;

/// 채팅방 조회
pub const GET_CHAT: &str =
    "SELECT id, item_id, buyer_id, seller_id, is_approved, created_at, updated_at FROM chats WHERE id = $1";

/// 채팅방 조회 (item, buyer, seller)
pub const GET_CHAT_BY_PARTICIPANTS: &str = r#"
    SELECT id, item_id, buyer_id, seller_id, is_approved, created_at, updated_at
    FROM chats
    WHERE item_id = $1 AND buyer_id = $2 AND seller_id = $3
"#;

/// 채팅방 승인
pub const APPROVE_CHAT: &str = r#"
    UPDATE chats SET is_approved = TRUE, updated_at = $2
    WHERE id = $1
    RETURNING id, item_id, buyer_id, seller_id, is_approved, created_at, updated_at
"#;

/// 사용자의 채팅방 목록
pub const GET_CHATS_FOR_USER: &str = r#"
    SELECT id, item_id, buyer_id, seller_id, is_approved, created_at, updated_at
    FROM chats
    WHERE buyer_id = $1 OR seller_id = $1
    ORDER BY updated_at DESC, id DESC
    LIMIT $2
"#;

/// 채팅방 갱신 시각
pub const TOUCH_CHAT: &str = "UPDATE chats SET updated_at = $2 WHERE id = $1";

/// 메시지 추가
pub const INSERT_CHAT_MESSAGE: &str = r#"
    INSERT INTO chat_messages (chat_id, sender_id, content, created_at)
    VALUES ($1, $2, $3, $4)
    RETURNING id, chat_id, sender_id, content, created_at
"#;

/// 메시지 조회 (작성 순)
pub const GET_CHAT_MESSAGES: &str = r#"
    SELECT id, chat_id, sender_id, content, created_at
    FROM chat_messages
    WHERE chat_id = $1
    ORDER BY created_at ASC, id ASC
    LIMIT $2
"#;

/// 메시지 삭제 (채팅방보다 먼저)
pub const DELETE_CHAT_MESSAGES: &str = "DELETE FROM chat_messages WHERE chat_id = $1";

/// 채팅방 삭제
pub const DELETE_CHAT: &str = "DELETE FROM chats WHERE id = $1";

/// 사용자 조회
pub const GET_USER: &str = r#"
    SELECT id, email, first_name, last_name, role, pickup_timeout_count, pickup_timeout_flagged
    FROM users
    WHERE id = $1
"#;

/// 노쇼 카운트 증가
pub const INCREMENT_PICKUP_TIMEOUT: &str = r#"
    UPDATE users SET pickup_timeout_count = pickup_timeout_count + $2
    WHERE id = $1
    RETURNING id, email, first_name, last_name, role, pickup_timeout_count, pickup_timeout_flagged
"#;

/// 노쇼 플래그 (한 번만)
pub const FLAG_PICKUP_TIMEOUT: &str =
    "UPDATE users SET pickup_timeout_flagged = TRUE WHERE id = $1 AND pickup_timeout_flagged = FALSE";

/// 관리자 목록
pub const GET_ADMIN_IDS: &str = "SELECT id FROM users WHERE role = 'admin' ORDER BY id";
