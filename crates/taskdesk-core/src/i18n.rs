/// User-facing message catalog. The dashboard ships bilingual
/// (English/Arabic) strings; which one surfaces is a config choice,
/// never a code path difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    Ar,
}

impl Lang {
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "ar" | "arabic" => Lang::Ar,
            _ => Lang::En,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Msg {
    NoTasksFound,
    ErrorLoadingTasks,
    ServerConnectionFailed,
    TaskCompleted,
    TaskUpdated,
    FailedToUpdateTask,
    TaskDoesNotExist,
    NoPermissionToEdit,
    NoPermissionToView,
    TaskWord,
}

pub fn text(lang: Lang, msg: Msg) -> &'static str {
    match (lang, msg) {
        (Lang::En, Msg::NoTasksFound) => "No tasks found",
        (Lang::Ar, Msg::NoTasksFound) => "لا توجد مهام",
        (Lang::En, Msg::ErrorLoadingTasks) => "Error loading tasks",
        (Lang::Ar, Msg::ErrorLoadingTasks) => "خطأ في تحميل المهام",
        (Lang::En, Msg::ServerConnectionFailed) => "Server connection failed",
        (Lang::Ar, Msg::ServerConnectionFailed) => "فشل الاتصال بالخادم",
        (Lang::En, Msg::TaskCompleted) => "Task completed successfully",
        (Lang::Ar, Msg::TaskCompleted) => "تم إكمال المهمة بنجاح",
        (Lang::En, Msg::TaskUpdated) => "Task updated successfully",
        (Lang::Ar, Msg::TaskUpdated) => "تم تحديث المهمة بنجاح",
        (Lang::En, Msg::FailedToUpdateTask) => "Failed to update task",
        (Lang::Ar, Msg::FailedToUpdateTask) => "فشل تحديث المهمة",
        (Lang::En, Msg::TaskDoesNotExist) => "Task does not exist",
        (Lang::Ar, Msg::TaskDoesNotExist) => "المهمة غير موجودة",
        (Lang::En, Msg::NoPermissionToEdit) => "You don't have permission to modify this task",
        (Lang::Ar, Msg::NoPermissionToEdit) => "ليس لديك صلاحية لتعديل هذه المهمة",
        (Lang::En, Msg::NoPermissionToView) => "You don't have permission to view this task",
        (Lang::Ar, Msg::NoPermissionToView) => "ليس لديك صلاحية لعرض هذه المهمة",
        (Lang::En, Msg::TaskWord) => "Task(s)",
        (Lang::Ar, Msg::TaskWord) => "مهام",
    }
}

/// Rejection line naming the fields a save attempt is not allowed to
/// touch.
pub fn cannot_edit_fields(lang: Lang, fields: &str) -> String {
    match lang {
        Lang::En => format!("You cannot edit the following fields: {fields}"),
        Lang::Ar => format!("لا يمكنك تعديل الحقول التالية: {fields}"),
    }
}

/// Localized weekday name for the verbose date format.
pub fn weekday_name(lang: Lang, weekday: chrono::Weekday) -> &'static str {
    use chrono::Weekday::*;
    match (lang, weekday) {
        (Lang::En, Mon) => "Monday",
        (Lang::En, Tue) => "Tuesday",
        (Lang::En, Wed) => "Wednesday",
        (Lang::En, Thu) => "Thursday",
        (Lang::En, Fri) => "Friday",
        (Lang::En, Sat) => "Saturday",
        (Lang::En, Sun) => "Sunday",
        (Lang::Ar, Mon) => "الاثنين",
        (Lang::Ar, Tue) => "الثلاثاء",
        (Lang::Ar, Wed) => "الأربعاء",
        (Lang::Ar, Thu) => "الخميس",
        (Lang::Ar, Fri) => "الجمعة",
        (Lang::Ar, Sat) => "السبت",
        (Lang::Ar, Sun) => "الأحد",
    }
}

/// Localized Gregorian month name, 1-based as chrono reports it.
pub fn month_name(lang: Lang, month: u32) -> &'static str {
    const EN: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    const AR: [&str; 12] = [
        "يناير",
        "فبراير",
        "مارس",
        "أبريل",
        "مايو",
        "يونيو",
        "يوليو",
        "أغسطس",
        "سبتمبر",
        "أكتوبر",
        "نوفمبر",
        "ديسمبر",
    ];
    let table = match lang {
        Lang::En => &EN,
        Lang::Ar => &AR,
    };
    let Some(name) = table.get(month.saturating_sub(1) as usize) else {
        return "";
    };
    name
}

/// Localized AM/PM marker.
pub fn meridiem(lang: Lang, is_pm: bool) -> &'static str {
    match (lang, is_pm) {
        (Lang::En, false) => "AM",
        (Lang::En, true) => "PM",
        (Lang::Ar, false) => "ص",
        (Lang::Ar, true) => "م",
    }
}
