//! Catalog service: authors, categories, books and their copies

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, CreateAuthor, UpdateAuthor},
        book::{normalize_isbn, BookDetails, BookQuery, BookShort, CreateBook, UpdateBook},
        category::{Category, CreateCategory, UpdateCategory},
        copy::{generated_barcode, normalize_barcode, BookCopy, CopyLabel, CopyQr, CreateCopy, UpdateCopy},
        Book, Paginated, Pagination,
    },
    qr::QrRenderer,
    repository::Repository,
};

/// Keep the first occurrence of each id
fn dedup_ids(ids: &[i32]) -> Vec<i32> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn optional_isbn(raw: Option<&str>) -> AppResult<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(isbn) => normalize_isbn(isbn).map(Some).map_err(AppError::Validation),
        None => Ok(None),
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    qr: Arc<dyn QrRenderer>,
}

impl CatalogService {
    pub fn new(repository: Repository, qr: Arc<dyn QrRenderer>) -> Self {
        Self { repository, qr }
    }

    // ---- Authors ----

    pub async fn list_authors(&self, q: Option<&str>) -> AppResult<Vec<Author>> {
        self.repository.authors.list(q).await
    }

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository.authors.get_by_id(id).await
    }

    pub async fn create_author(&self, data: CreateAuthor) -> AppResult<Author> {
        self.repository.authors.create(&data).await
    }

    /// Renaming an author refreshes the search text of their books
    pub async fn update_author(&self, id: i32, data: UpdateAuthor) -> AppResult<Author> {
        let author = self.repository.authors.update(id, &data).await?;
        if data.lastname.is_some() || data.firstname.is_some() {
            for book_id in self.repository.authors.book_ids(id).await? {
                self.repository.books.refresh_search_key(book_id).await?;
            }
        }
        Ok(author)
    }

    pub async fn delete_author(&self, id: i32) -> AppResult<()> {
        let author = self.repository.authors.get_by_id(id).await?;
        let nb_books = author.nb_books.unwrap_or(0);
        if nb_books > 0 {
            return Err(AppError::BusinessRule(format!(
                "Author is credited on {} book(s)",
                nb_books
            )));
        }
        self.repository.authors.delete(id).await
    }

    // ---- Categories ----

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.categories.list().await
    }

    pub async fn get_category(&self, id: i32) -> AppResult<Category> {
        self.repository.categories.get_by_id(id).await
    }

    pub async fn create_category(&self, data: CreateCategory) -> AppResult<Category> {
        self.repository.categories.create(&data).await
    }

    pub async fn update_category(&self, id: i32, data: UpdateCategory) -> AppResult<Category> {
        self.repository.categories.update(id, &data).await
    }

    pub async fn delete_category(&self, id: i32) -> AppResult<()> {
        self.repository.categories.delete(id).await
    }

    // ---- Books ----

    pub async fn search_books(&self, query: &BookQuery) -> AppResult<Paginated<BookShort>> {
        let pagination = Pagination { page: query.page, per_page: query.per_page };
        let (books, total) = self
            .repository
            .books
            .search(query, pagination.per_page(), pagination.offset())
            .await?;
        Ok(Paginated::new(books, total, &pagination))
    }

    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        let book = self.repository.books.get_by_id(id).await?;
        let authors = self.repository.books.get_authors(id).await?;
        let category = match book.category_id {
            Some(category_id) => Some(self.repository.categories.get_by_id(category_id).await?),
            None => None,
        };
        let (nb_copies, nb_available) = self.repository.books.copy_counts(id).await?;

        Ok(BookDetails { book, authors, category, nb_copies, nb_available })
    }

    async fn check_references(&self, category_id: Option<i32>, author_ids: Option<&[i32]>) -> AppResult<()> {
        if let Some(category_id) = category_id {
            self.repository.categories.get_by_id(category_id).await.map_err(|e| match e {
                AppError::NotFound(msg) => AppError::Validation(msg),
                other => other,
            })?;
        }
        if let Some(ids) = author_ids {
            let missing = self.repository.authors.missing_ids(ids).await?;
            if !missing.is_empty() {
                return Err(AppError::Validation(format!("Unknown author ids: {:?}", missing)));
            }
        }
        Ok(())
    }

    pub async fn create_book(&self, mut data: CreateBook) -> AppResult<BookDetails> {
        let isbn = optional_isbn(data.isbn.as_deref())?;
        data.author_ids = dedup_ids(&data.author_ids);
        self.check_references(data.category_id, Some(&data.author_ids)).await?;

        let book = self.repository.books.create(&data, isbn).await?;
        tracing::info!(book_id = book.id, title = %book.title, "Book created");
        self.get_book(book.id).await
    }

    pub async fn update_book(&self, id: i32, mut data: UpdateBook) -> AppResult<BookDetails> {
        let isbn = optional_isbn(data.isbn.as_deref())?;
        data.author_ids = data.author_ids.as_deref().map(dedup_ids);
        self.check_references(data.category_id, data.author_ids.as_deref()).await?;

        self.repository.books.update(id, &data, isbn).await?;
        self.get_book(id).await
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let book: Book = self.repository.books.get_by_id(id).await?;
        let open = self.repository.books.count_open_loans(id).await?;
        if open > 0 {
            return Err(AppError::BusinessRule(format!(
                "{} cop{} of this book on loan",
                open,
                if open == 1 { "y is" } else { "ies are" }
            )));
        }
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, title = %book.title, "Book deleted");
        Ok(())
    }

    // ---- Copies ----

    pub async fn list_copies(&self, book_id: i32) -> AppResult<Vec<BookCopy>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.copies.list_for_book(book_id).await
    }

    pub async fn get_copy(&self, id: i32) -> AppResult<BookCopy> {
        self.repository.copies.get_by_id(id).await
    }

    pub async fn find_copy_by_barcode(&self, barcode: &str) -> AppResult<BookCopy> {
        let barcode = normalize_barcode(barcode).map_err(AppError::Validation)?;
        self.repository.copies.get_by_barcode(&barcode).await
    }

    /// Next free generated barcode for a book
    async fn next_barcode(&self, book_id: i32) -> AppResult<String> {
        let mut sequence = self.repository.copies.count_for_book(book_id).await? + 1;
        loop {
            let candidate = generated_barcode(book_id, sequence);
            if !self.repository.copies.barcode_exists(&candidate).await? {
                return Ok(candidate);
            }
            sequence += 1;
        }
    }

    pub async fn create_copy(&self, book_id: i32, data: CreateCopy) -> AppResult<BookCopy> {
        self.repository.books.get_by_id(book_id).await?;

        let barcode = match data.barcode.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(raw) => normalize_barcode(raw).map_err(AppError::Validation)?,
            None => self.next_barcode(book_id).await?,
        };

        let copy = self.repository.copies.create(book_id, &data, &barcode).await?;
        tracing::info!(copy_id = copy.id, book_id, barcode = %copy.barcode, "Copy created");
        Ok(copy)
    }

    pub async fn update_copy(&self, id: i32, data: UpdateCopy) -> AppResult<BookCopy> {
        let barcode = data
            .barcode
            .as_deref()
            .map(normalize_barcode)
            .transpose()
            .map_err(AppError::Validation)?;
        self.repository.copies.update(id, &data, barcode).await
    }

    pub async fn delete_copy(&self, id: i32) -> AppResult<()> {
        let copy = self.repository.copies.get_by_id(id).await?;
        if copy.loan_id.is_some() {
            return Err(AppError::BusinessRule("Copy is on loan".to_string()));
        }
        self.repository.copies.delete(id).await
    }

    /// Label payload and QR image URL for each copy of a book
    pub async fn get_book_copies_qrs(&self, book_id: i32) -> AppResult<Vec<CopyQr>> {
        let copies = self.list_copies(book_id).await?;
        copies
            .iter()
            .map(|copy| {
                let payload = serde_json::to_string(&CopyLabel::for_copy(copy))
                    .map_err(|e| AppError::Internal(format!("Failed to encode label: {}", e)))?;
                Ok(CopyQr {
                    copy_id: copy.id,
                    barcode: copy.barcode.clone(),
                    qr_url: self.qr.image_url(&payload),
                    payload,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_credit_order() {
        assert_eq!(dedup_ids(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(dedup_ids(&[]).is_empty());
    }

    #[test]
    fn test_optional_isbn() {
        assert_eq!(optional_isbn(None).unwrap(), None);
        assert_eq!(optional_isbn(Some("  ")).unwrap(), None);
        assert_eq!(
            optional_isbn(Some("978-0-306-40615-7")).unwrap().as_deref(),
            Some("9780306406157")
        );
        assert!(matches!(optional_isbn(Some("123")), Err(AppError::Validation(_))));
    }
}
